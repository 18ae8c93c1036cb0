//! The serial bus our card driver talks through.
//!
//! Defines the functionality of a full-duplex, chip-select gated byte
//! transport, and provides an implementation of it over the
//! [`embedded-hal`](embedded_hal) SPI and GPIO traits.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

/// The filler byte clocked out whenever we only care about what comes back.
///
/// Keeping the data-out line high between frames is what the card expects;
/// it also doubles as the dummy checksum payload on writes.
pub const FILL_BYTE: u8 = 0xFF;

/// Bus clock rate selection.
///
/// SD cards must be woken up below 400 kHz and can then be switched to a
/// faster data rate once initialisation is complete.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BusSpeed {
    /// The 100 to 400 kHz rate used while the card boots.
    Slow,
    /// The full data rate used once the card reports ready.
    Fast,
}

/// Defines the functionality of a transport mechanism over which the card
/// protocol is executed.
///
/// All methods are infallible: a byte exchange on a synchronous bus is a
/// fixed-latency hardware operation and is assumed never to hang. Failures
/// surface one layer up, as protocol timeouts and rejections.
pub trait BusTransport {
    /// Shift one byte out and simultaneously shift one byte in, blocking
    /// until the hardware reports the transfer complete.
    fn transfer_byte(&mut self, out: u8) -> u8;

    /// Drive the chip-select line low, addressing the card.
    fn select(&mut self);

    /// Drive the chip-select line high, releasing the card.
    fn deselect(&mut self);

    /// Switch the bus clock rate.
    ///
    /// Implementations without a switchable clock can leave this as the
    /// provided no-op.
    fn set_speed(&mut self, _speed: BusSpeed) {}

    /// Receive one byte by clocking out a filler byte.
    fn read_byte(&mut self) -> u8 {
        self.transfer_byte(FILL_BYTE)
    }

    /// Send one byte, discarding whatever comes back.
    fn write_byte(&mut self, out: u8) {
        let _ = self.transfer_byte(out);
    }

    /// Send every byte in the given buffer.
    fn write_bytes(&mut self, out: &[u8]) {
        for &b in out {
            self.write_byte(b);
        }
    }

    /// Receive bytes until the given buffer is full.
    fn read_bytes(&mut self, buffer: &mut [u8]) {
        for b in buffer.iter_mut() {
            *b = self.read_byte();
        }
    }
}

impl<T> BusTransport for &mut T
where
    T: BusTransport + ?Sized,
{
    fn transfer_byte(&mut self, out: u8) -> u8 {
        (**self).transfer_byte(out)
    }

    fn select(&mut self) {
        (**self).select()
    }

    fn deselect(&mut self) {
        (**self).deselect()
    }

    fn set_speed(&mut self, speed: BusSpeed) {
        (**self).set_speed(speed)
    }

    fn read_byte(&mut self) -> u8 {
        (**self).read_byte()
    }

    fn write_byte(&mut self, out: u8) {
        (**self).write_byte(out)
    }

    fn write_bytes(&mut self, out: &[u8]) {
        (**self).write_bytes(out)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) {
        (**self).read_bytes(buffer)
    }
}

/// A [`BusTransport`] over an exclusively-owned SPI bus and chip-select pin.
///
/// The error types of both peripherals are bound to [`Infallible`], keeping
/// the no-failure-modes contract visible in the signature. Most HALs offer
/// infallible pin and bus drivers; wrap yours if it reports errors you want
/// to treat as fatal.
///
/// The clock rate is owned by the underlying bus, so [`set_speed`] here is
/// the no-op default; re-clock the peripheral through [`bus`] if your HAL
/// supports it.
///
/// [`set_speed`]: BusTransport::set_speed
/// [`bus`]: SpiBusTransport::bus
pub struct SpiBusTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiBusTransport<SPI, CS>
where
    SPI: SpiBus<u8, Error = Infallible>,
    CS: OutputPin<Error = Infallible>,
{
    /// Create a new transport from an SPI bus and a chip-select pin.
    ///
    /// The pin is driven high (deselected) straight away, so the card is
    /// not addressed before the first transaction.
    pub fn new(spi: SPI, cs: CS) -> SpiBusTransport<SPI, CS> {
        let mut t = SpiBusTransport { spi, cs };
        t.deselect();
        t
    }

    /// Temporary access to the SPI bus, for host-specific control such as
    /// re-clocking the peripheral.
    pub fn bus<T, F>(&mut self, func: F) -> T
    where
        F: FnOnce(&mut SPI) -> T,
    {
        func(&mut self.spi)
    }

    /// Consume the transport and return the underlying peripherals.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS> BusTransport for SpiBusTransport<SPI, CS>
where
    SPI: SpiBus<u8, Error = Infallible>,
    CS: OutputPin<Error = Infallible>,
{
    fn transfer_byte(&mut self, out: u8) -> u8 {
        let mut received = [FILL_BYTE];
        infallible(self.spi.transfer(&mut received, &[out]));
        infallible(self.spi.flush());
        received[0]
    }

    fn select(&mut self) {
        infallible(self.cs.set_low());
    }

    fn deselect(&mut self) {
        infallible(self.cs.set_high());
    }

    fn write_bytes(&mut self, out: &[u8]) {
        infallible(self.spi.write(out));
        infallible(self.spi.flush());
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) {
        buffer.fill(FILL_BYTE);
        infallible(self.spi.transfer_in_place(buffer));
        infallible(self.spi.flush());
    }
}

/// Unpack a result that cannot actually hold an error.
fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

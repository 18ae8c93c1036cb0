//! The SPI-mode SD card driver.
//!
//! Implements the command protocol and the single-block transfer
//! transactions on some generic serial bus, and walks the card through its
//! power-up state machine.
//!
//! This is currently optimised for readability and debugability, not
//! performance.

pub mod proto;

// =============================================================================
// Imports
// =============================================================================

use embedded_hal::delay::DelayNs;

use crate::blockdevice::{Block, BlockIdx};
use crate::transport::{BusSpeed, BusTransport, FILL_BYTE};
use crate::{debug, trace, warn};
use proto::*;

// =============================================================================
// Constants
// =============================================================================

/// How many filler bytes wake the bus up. Cards want at least 74 clock
/// edges before their first command; ten bytes is 80.
const WAKE_UP_FILLS: usize = 10;

// =============================================================================
// Types and Implementations
// =============================================================================

/// Retry and poll budgets for every stage of a card conversation.
///
/// The defaults bound worst-case initialisation latency to roughly one
/// second. Tests substitute smaller budgets and zero delays; production
/// code normally leaves them alone.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts at the "go idle" reset before giving up.
    pub idle_attempts: u32,
    /// Attempts at the "send operating condition" stage before giving up.
    pub op_cond_attempts: u32,
    /// Reads allowed for a command's status byte to turn valid.
    pub response_polls: u32,
    /// Reads allowed for a start-of-data token to arrive.
    pub data_token_polls: u32,
    /// Reads allowed for the card to finish a write and release busy.
    pub write_busy_polls: u32,
    /// Pause between initialisation attempts, in microseconds.
    pub attempt_delay_us: u32,
    /// Pause between write-busy polls, in microseconds.
    pub busy_poll_delay_us: u32,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            idle_attempts: 10,
            op_cond_attempts: 100,
            response_polls: 10,
            data_token_polls: 65535,
            write_busy_polls: 50_000,
            attempt_delay_us: 10_000,
            busy_poll_delay_us: 10,
        }
    }
}

/// The lifecycle of a card, as far as this driver has observed it.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardState {
    /// No boot sequence has completed since power-on (or since
    /// [`SdCard::mark_uninitialized`]).
    Uninitialized,
    /// The boot sequence completed; the card accepts block commands.
    Ready,
    /// The last boot sequence failed. Only a fresh
    /// [`SdCard::initialize`] leaves this state.
    Faulted,
}

/// The possible errors this driver can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The card never reported idle while we tried to reset it
    CardNotIdle,
    /// The card did not accept our supply voltage range
    VoltageCheckFailed,
    /// The card never left the idle state during initialisation
    CardNotReady,
    /// The card rejected the command with this opcode
    CommandRejected(u8),
    /// The card never produced a start-of-data token
    DataTokenTimeout,
    /// The card's data response refused the block we wrote
    DataRejected,
    /// The card stayed busy after a write until our patience ran out
    WriteTimeout,
}

/// Driver for an SPI attached SD card.
///
/// Generic over the [`BusTransport`] carrying the bytes and the
/// [`DelayNs`] provider pacing the retries. All operations are blocking,
/// and the driver owns the bus for as long as it lives; get the pieces
/// back with [`free`](SdCard::free).
pub struct SdCard<T, D>
where
    T: BusTransport,
    D: DelayNs,
{
    bus: T,
    delay: D,
    state: CardState,
    retries: RetryPolicy,
}

impl<T, D> SdCard<T, D>
where
    T: BusTransport,
    D: DelayNs,
{
    /// Create a new driver with the default retry policy.
    ///
    /// The card starts out [`Uninitialized`](CardState::Uninitialized);
    /// call [`initialize`](SdCard::initialize) before any block I/O.
    pub fn new(bus: T, delay: D) -> SdCard<T, D> {
        SdCard::new_with_retries(bus, delay, RetryPolicy::default())
    }

    /// Create a new driver with the given retry policy.
    pub fn new_with_retries(bus: T, delay: D, retries: RetryPolicy) -> SdCard<T, D> {
        SdCard {
            bus,
            delay,
            state: CardState::Uninitialized,
            retries,
        }
    }

    /// The card lifecycle state, as of the last operation.
    pub fn state(&self) -> CardState {
        self.state
    }

    /// Forget that the card was ever initialised, without any bus I/O.
    ///
    /// The next [`initialize`](SdCard::initialize) runs the full boot
    /// sequence again. Call this when the card may have been swapped.
    pub fn mark_uninitialized(&mut self) {
        self.state = CardState::Uninitialized;
    }

    /// Consume the driver and get back the transport and delay provider.
    pub fn free(self) -> (T, D) {
        (self.bus, self.delay)
    }

    /// Run the boot state machine until the card is ready for block I/O.
    ///
    /// On success the card is [`Ready`](CardState::Ready) and the bus has
    /// been switched to its fast clock. Any failure leaves the card
    /// [`Faulted`](CardState::Faulted) and deselected.
    pub fn initialize(&mut self) -> Result<(), Error> {
        let result = self.boot_sequence();
        self.state = match result {
            Ok(()) => CardState::Ready,
            Err(_) => CardState::Faulted,
        };
        result
    }

    fn boot_sequence(&mut self) -> Result<(), Error> {
        debug!("initialising card");
        self.bus.set_speed(BusSpeed::Slow);

        // Wake the card: deselected, with the data-out line held high.
        self.bus.deselect();
        for _ in 0..WAKE_UP_FILLS {
            self.bus.write_byte(FILL_BYTE);
        }

        self.reset_to_idle()?;
        self.check_voltage_range()?;
        self.wait_for_ready()?;
        self.read_ocr();

        self.bus.set_speed(BusSpeed::Fast);
        debug!("card initialised");
        Ok(())
    }

    /// Keep resetting the card until it answers with exactly the idle
    /// status.
    fn reset_to_idle(&mut self) -> Result<(), Error> {
        for _attempt in 0..self.retries.idle_attempts {
            let status = self.send_command(Command::go_idle());
            self.end_transaction();
            if status.is_idle() {
                debug!("card went idle on attempt {}", _attempt + 1);
                return Ok(());
            }
            trace!("card not idle (status {:x}), waiting", status.0);
            self.delay.delay_us(self.retries.attempt_delay_us);
        }
        warn!("card never went idle");
        Err(Error::CardNotIdle)
    }

    /// Check the card can run from our supply voltage.
    ///
    /// A card that does not understand the command is a hard failure
    /// here; version 1 cards are not supported.
    fn check_voltage_range(&mut self) -> Result<(), Error> {
        let status = self.send_command(Command::send_if_cond());
        // The trailer echoes the voltage window and check pattern; it
        // must be drained before the card is released.
        let mut trailer = [0u8; 4];
        self.bus.read_bytes(&mut trailer);
        self.end_transaction();
        if !status.is_idle() {
            warn!("interface condition rejected (status {:x})", status.0);
            return Err(Error::VoltageCheckFailed);
        }
        trace!("interface condition trailer {:?}", trailer);
        Ok(())
    }

    /// Repeat the application command pair until the card reports ready.
    fn wait_for_ready(&mut self) -> Result<(), Error> {
        for _attempt in 0..self.retries.op_cond_attempts {
            // The prefix response does not matter, only the pair result.
            self.send_command(Command::app_command());
            let status = self.send_command(Command::send_op_cond());
            self.end_transaction();
            if status.is_ready() {
                debug!("card ready after {} attempts", _attempt + 1);
                return Ok(());
            }
            trace!("card still idle (status {:x})", status.0);
            self.delay.delay_us(self.retries.attempt_delay_us);
        }
        warn!("card never became ready");
        Err(Error::CardNotReady)
    }

    /// Read the operating conditions register, completing the handshake.
    /// The register contents are not interpreted.
    fn read_ocr(&mut self) {
        let _status = self.send_command(Command::read_ocr());
        let mut ocr = [0u8; 4];
        self.bus.read_bytes(&mut ocr);
        self.end_transaction();
        trace!("ocr {:?}", ocr);
    }

    /// Read the 512 byte block at the given index into the given buffer.
    ///
    /// The buffer is written only on success.
    pub fn read_block(&mut self, block_idx: BlockIdx, block: &mut Block) -> Result<(), Error> {
        debug!("reading block {}", block_idx.0);
        let status = self.send_command(Command::read_single_block(block_idx.0));
        if !status.is_ready() {
            self.end_transaction();
            warn!("read command rejected (status {:x})", status.0);
            return Err(Error::CommandRejected(CMD17));
        }
        if !self.wait_for_data_token() {
            self.end_transaction();
            return Err(Error::DataTokenTimeout);
        }
        self.bus.read_bytes(block);
        // Two checksum bytes close the block; they are not verified.
        let _crc = [self.bus.read_byte(), self.bus.read_byte()];
        self.end_transaction();
        Ok(())
    }

    /// Write the given 512 byte block to the given index.
    pub fn write_block(&mut self, block_idx: BlockIdx, block: &Block) -> Result<(), Error> {
        debug!("writing block {}", block_idx.0);
        let status = self.send_command(Command::write_single_block(block_idx.0));
        if !status.is_ready() {
            self.end_transaction();
            warn!("write command rejected (status {:x})", status.0);
            return Err(Error::CommandRejected(CMD24));
        }
        // One byte of gap, then the token, the payload and a dummy
        // checksum the card does not look at.
        self.bus.write_byte(FILL_BYTE);
        self.bus.write_byte(DATA_START_TOKEN);
        self.bus.write_bytes(block);
        self.bus.write_bytes(&[FILL_BYTE, FILL_BYTE]);
        let response = self.bus.read_byte();
        if (response & DATA_RES_MASK) != DATA_RES_ACCEPTED {
            self.end_transaction();
            warn!("block not accepted (data response {:x})", response);
            return Err(Error::DataRejected);
        }
        if !self.wait_while_busy() {
            self.end_transaction();
            return Err(Error::WriteTimeout);
        }
        self.end_transaction();
        Ok(())
    }

    /// Frame and send one command, then poll for its R1 status.
    ///
    /// Leaves the card selected: the caller drains any extra response
    /// bytes it expects, then calls [`end_transaction`](Self::end_transaction).
    /// If the card never answers, the returned status still has its top
    /// bit set and reads as neither idle nor ready.
    fn send_command(&mut self, command: Command) -> R1Status {
        self.bus.select();
        self.bus.write_byte(FILL_BYTE);
        self.bus.write_bytes(&command.frame());
        let mut status = R1Status(self.bus.read_byte());
        let mut polls = 1;
        while !status.is_valid() && polls < self.retries.response_polls {
            status = R1Status(self.bus.read_byte());
            polls += 1;
        }
        trace!("cmd {} -> status {:x}", command.opcode, status.0);
        status
    }

    /// Release the card, and give it eight clocks to let go of the bus.
    fn end_transaction(&mut self) {
        self.bus.deselect();
        self.bus.write_byte(FILL_BYTE);
    }

    /// Poll until the card announces the start of a data block.
    fn wait_for_data_token(&mut self) -> bool {
        for _ in 0..self.retries.data_token_polls {
            if self.bus.read_byte() == DATA_START_TOKEN {
                return true;
            }
        }
        warn!("start-of-data token never arrived");
        false
    }

    /// Poll while the card holds its data line at zero, signalling busy.
    ///
    /// Bounded by the retry policy's busy budget.
    fn wait_while_busy(&mut self) -> bool {
        for _ in 0..self.retries.write_busy_polls {
            if self.bus.read_byte() != 0x00 {
                return true;
            }
            self.delay.delay_us(self.retries.busy_poll_delay_us);
        }
        warn!("card still busy after write");
        false
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

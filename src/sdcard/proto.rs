//! SPI-mode SD card protocol definitions.
//!
//! The opcodes, tokens and response flags the driver speaks, and the six
//! byte command frame that carries them. See the SD Card Association's
//! Physical Layer Simplified Specification for where these values come
//! from.

use byteorder::{BigEndian, ByteOrder};

/// GO_IDLE_STATE - reset the card and enter SPI mode
pub const CMD0: u8 = 0x00;
/// SEND_IF_COND - check the supply voltage against the card's range
pub const CMD8: u8 = 0x08;
/// READ_SINGLE_BLOCK - read one data block
pub const CMD17: u8 = 0x11;
/// WRITE_BLOCK - write one data block
pub const CMD24: u8 = 0x18;
/// SD_SEND_OP_COND - start card initialisation (application command)
pub const ACMD41: u8 = 0x29;
/// APP_CMD - the next command is an application command
pub const CMD55: u8 = 0x37;
/// READ_OCR - read the operating conditions register
pub const CMD58: u8 = 0x3A;

/// Start and transmission bits prefixed to every opcode on the wire.
pub const CMD_FRAME_BITS: u8 = 0x40;

/// R1 status of a fully initialised card with no flags raised.
pub const R1_READY_STATE: u8 = 0x00;
/// R1 status of a card still in its boot sequence.
pub const R1_IDLE_STATE: u8 = 0x01;
/// R1 flag raised when the card did not recognise a command.
pub const R1_ILLEGAL_COMMAND: u8 = 0x04;

/// Marks the start of a 512 byte data block, in either direction.
pub const DATA_START_TOKEN: u8 = 0xFE;
/// Masks the meaningful bits of the data response token.
pub const DATA_RES_MASK: u8 = 0x1F;
/// Data response pattern for "data accepted".
pub const DATA_RES_ACCEPTED: u8 = 0x05;

/// A single byte R1 status response.
///
/// The card repeats all-ones until its response is ready, so the byte is
/// only valid once bit 7 reads as zero. The bits below it are status
/// flags.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct R1Status(pub u8);

impl R1Status {
    /// Has the card actually answered yet?
    pub fn is_valid(self) -> bool {
        self.0 & 0x80 == 0
    }

    /// Is this exactly the idle status, as expected mid boot sequence?
    pub fn is_idle(self) -> bool {
        self.0 == R1_IDLE_STATE
    }

    /// Is this exactly the ready status, with no flags raised?
    pub fn is_ready(self) -> bool {
        self.0 == R1_READY_STATE
    }

    /// Did the card refuse the command outright?
    pub fn illegal_command(self) -> bool {
        self.0 & R1_ILLEGAL_COMMAND != 0
    }
}

/// A command: opcode, 32 bit argument and checksum byte.
///
/// Commands are stateless values; build one with a constructor and
/// serialise it with [`frame`](Command::frame). Only the first two
/// commands a card sees are CRC checked, so the rest carry a fixed byte
/// the card accepts without looking.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Command {
    /// The opcode, 0 to 63.
    pub opcode: u8,
    /// The argument, sent most significant byte first.
    pub argument: u32,
    /// CRC7 plus stop bit, or a fixed stand-in once CRC is off.
    pub checksum: u8,
}

impl Command {
    /// CMD0: put the card into the idle state, entering SPI mode.
    pub const fn go_idle() -> Command {
        Command {
            opcode: CMD0,
            argument: 0,
            checksum: 0x95,
        }
    }

    /// CMD8: check the card accepts a 2.7-3.6 V supply.
    ///
    /// The low byte of the argument is a check pattern the card echoes
    /// back in its response trailer.
    pub const fn send_if_cond() -> Command {
        Command {
            opcode: CMD8,
            argument: 0x1AA,
            checksum: 0x87,
        }
    }

    /// CMD55: announce that the next command is an application command.
    pub const fn app_command() -> Command {
        Command {
            opcode: CMD55,
            argument: 0,
            checksum: 0x65,
        }
    }

    /// ACMD41: start initialisation, advertising high capacity support.
    pub const fn send_op_cond() -> Command {
        Command {
            opcode: ACMD41,
            argument: 0x4000_0000,
            checksum: 0x77,
        }
    }

    /// CMD58: read the operating conditions register.
    pub const fn read_ocr() -> Command {
        Command {
            opcode: CMD58,
            argument: 0,
            checksum: 0x00,
        }
    }

    /// CMD17: read the single block at the given address.
    pub const fn read_single_block(address: u32) -> Command {
        Command {
            opcode: CMD17,
            argument: address,
            checksum: 0x01,
        }
    }

    /// CMD24: write the single block at the given address.
    pub const fn write_single_block(address: u32) -> Command {
        Command {
            opcode: CMD24,
            argument: address,
            checksum: 0x01,
        }
    }

    /// Serialise into the six byte wire frame.
    pub fn frame(self) -> [u8; 6] {
        let mut frame = [0u8; 6];
        frame[0] = CMD_FRAME_BITS | self.opcode;
        BigEndian::write_u32(&mut frame[1..5], self.argument);
        frame[5] = self.checksum;
        frame
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

//! # sdspi-disk
//!
//! > An SPI-mode SD card block device driver for Embedded Rust
//!
//! This crate speaks the SD-over-SPI command protocol from raw serial-bus
//! primitives: it walks a card through its power-up state machine, moves
//! single 512 byte blocks in both directions with bounded retries at every
//! stage, and presents the five-operation block device contract (status /
//! initialize / read / write / control) that an external FAT implementation
//! binds to. It is written in pure-Rust, is `#![no_std]` and does not use
//! `alloc`. It is designed for readability and simplicity over performance.
//!
//! ## Using the crate
//!
//! You will need something that implements the [`BusTransport`] trait: a
//! full-duplex byte exchange plus a chip-select line. [`SpiBusTransport`]
//! provides one over the `embedded-hal` SPI bus and output pin traits, or
//! you can implement the trait directly on your own hardware layer.
//!
//! ```rust
//! use sdspi_disk::{BlockIdx, BusTransport, DiskConfig, DiskError, SdCard, SdDisk};
//!
//! fn append_measurement<T, D>(bus: T, delay: D) -> Result<(), DiskError>
//! where
//!     T: BusTransport,
//!     D: embedded_hal::delay::DelayNs,
//! {
//!     let card = SdCard::new(bus, delay);
//!     let mut disk = SdDisk::new(card, DiskConfig::default());
//!     disk.initialize(0)?;
//!     let mut block = [0u8; 512];
//!     disk.read(0, core::slice::from_mut(&mut block), BlockIdx(100))?;
//!     block[0..4].copy_from_slice(b"emg,");
//!     disk.write(0, core::slice::from_ref(&block), BlockIdx(100))?;
//!     Ok(())
//! }
//! ```
//!
//! The geometry the filesystem layer sees (sector count, metadata
//! timestamp) comes from the [`DiskConfig`], not from the card.
//!
//! ## Features
//!
//! * `log`: Enabled by default. Generates log messages using the `log`
//!   crate.
//! * `defmt-log`: By turning off the default features and enabling the
//!   `defmt-log` feature you can configure this crate to log messages over
//!   defmt instead.
//!
//! You cannot enable both the `log` feature and the `defmt-log` feature.

#![cfg_attr(not(test), no_std)]

// =============================================================================
// Modules and exports
// =============================================================================

pub mod blockdevice;
pub mod disk;
pub mod sdcard;
pub mod timestamp;
pub mod transport;

#[doc(inline)]
pub use crate::blockdevice::{Block, BlockCount, BlockIdx, BLOCK_LEN, BLOCK_LEN_U32};

#[doc(inline)]
pub use crate::disk::{ControlQuery, DiskConfig, DiskError, DiskStatus, SdDisk};

#[doc(inline)]
pub use crate::sdcard::{CardState, Error as SdCardError, RetryPolicy, SdCard};

#[doc(inline)]
pub use crate::timestamp::Timestamp;

#[doc(inline)]
pub use crate::transport::{BusSpeed, BusTransport, SpiBusTransport, FILL_BYTE};

// =============================================================================
// Logging
// =============================================================================

#[cfg(all(feature = "defmt-log", feature = "log"))]
compile_error!("Cannot enable both log and defmt-log");

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::debug! but does nothing at all
macro_rules! debug {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::trace! but does nothing at all
macro_rules! trace {
    ($($arg:tt)+) => {};
}

#[cfg(all(not(feature = "defmt-log"), not(feature = "log")))]
#[macro_export]
/// Like log::warn! but does nothing at all
macro_rules! warn {
    ($($arg:tt)+) => {};
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

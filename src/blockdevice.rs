//! Types for working with 512 byte blocks.
//!
//! Generic types for addressing block storage, such as a newtype for
//! identifying a particular block on the device by its index.

/// A standard 512 byte block (also known as a sector).
///
/// Almost all SD/MMC cards in SPI mode transfer data in 512 byte blocks.
///
/// This library does not support devices with a block size other than 512
/// bytes.
pub type Block = [u8; BLOCK_LEN];

/// All our blocks are a fixed length of 512 bytes. We do not support
/// cards reconfigured to other block lengths.
pub const BLOCK_LEN: usize = 512;

/// Sometimes we want `LEN` as a `u32` and the casts don't look nice.
pub const BLOCK_LEN_U32: u32 = 512;

/// The linear numeric address of a block (or sector).
///
/// The first block on a device is `BlockIdx(0)`. Cards are addressed by
/// 32-bit block index; larger devices are not supported.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockIdx(pub u32);

/// A number of blocks (or sectors).
///
/// Add this to a [`BlockIdx`] to get an actual address on disk.
///
/// ```
/// # use sdspi_disk::{BlockCount, BlockIdx};
/// assert_eq!(BlockIdx(5) + BlockCount(2), BlockIdx(7));
/// ```
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockCount(pub u32);

impl core::ops::Add<BlockCount> for BlockIdx {
    type Output = BlockIdx;
    fn add(self, rhs: BlockCount) -> BlockIdx {
        BlockIdx(self.0 + rhs.0)
    }
}

impl core::ops::AddAssign<BlockCount> for BlockIdx {
    fn add_assign(&mut self, rhs: BlockCount) {
        self.0 += rhs.0
    }
}

impl core::ops::Add<BlockCount> for BlockCount {
    type Output = BlockCount;
    fn add(self, rhs: BlockCount) -> BlockCount {
        BlockCount(self.0 + rhs.0)
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

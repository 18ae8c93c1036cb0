//! The block device contract the filesystem layer consumes.
//!
//! Five operations: status, initialize, read, write and control. This is
//! the media-access shape a FAT implementation expects, with the geometry
//! supplied by configuration rather than measured from the card.

use embedded_hal::delay::DelayNs;

use crate::blockdevice::{Block, BlockCount, BlockIdx, BLOCK_LEN_U32};
use crate::sdcard::{CardState, SdCard};
use crate::timestamp::Timestamp;
use crate::transport::BusTransport;
use crate::warn;

/// Status of a disk unit, as the filesystem layer sees it.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiskStatus {
    /// The unit has not completed initialisation, or does not exist.
    NotInitialized,
    /// The unit is ready for block I/O.
    Ready,
}

/// The errors surfaced across the block device boundary.
///
/// Driver-level failure detail stops here: the filesystem layer only
/// learns that I/O failed, while the particulars go to the log.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiskError {
    /// A block operation or the boot sequence failed
    Io,
    /// A bad unit number, an empty buffer or an unsupported query
    InvalidParameter,
    /// The unit has not been initialised yet
    NotReady,
}

/// The queries [`control`](SdDisk::control) can answer.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlQuery {
    /// Flush any cached writes. This driver caches nothing, so the
    /// answer is always zero.
    Sync,
    /// The sector size, in bytes.
    SectorSize,
    /// The erase granularity, in sectors.
    EraseBlockSize,
    /// The total number of sectors.
    SectorCount,
    /// Discard a range of sectors. Not supported.
    Trim,
}

/// Identity and geometry of a disk unit, fixed at construction.
///
/// The capacity the filesystem sees comes from here, not from the card's
/// capacity register.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DiskConfig {
    /// The unit number this disk answers to.
    pub unit: u8,
    /// The advertised capacity.
    pub sector_count: BlockCount,
    /// The fixed instant stamped on to filesystem metadata.
    pub timestamp: Timestamp,
}

impl Default for DiskConfig {
    /// Unit 0, 32768 sectors (16 MiB), midnight on 2020-01-01.
    fn default() -> DiskConfig {
        DiskConfig {
            unit: 0,
            sector_count: BlockCount(32768),
            timestamp: Timestamp {
                year_since_1970: 50,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            },
        }
    }
}

/// An SD card presented as a numbered disk unit.
///
/// Every operation validates the unit number first; an unknown unit is
/// rejected without touching the bus.
pub struct SdDisk<T, D>
where
    T: BusTransport,
    D: DelayNs,
{
    card: SdCard<T, D>,
    config: DiskConfig,
}

impl<T, D> SdDisk<T, D>
where
    T: BusTransport,
    D: DelayNs,
{
    /// Present the given card driver as a disk unit.
    pub fn new(card: SdCard<T, D>, config: DiskConfig) -> SdDisk<T, D> {
        SdDisk { card, config }
    }

    /// The configuration this disk was built with.
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// The fixed instant the filesystem layer stamps on to metadata.
    ///
    /// There is no real-time clock behind this value. See
    /// [`Timestamp::to_fat_datetime`] for the packed form FAT stores.
    pub fn current_timestamp(&self) -> Timestamp {
        self.config.timestamp
    }

    /// Mutable access to the card driver underneath, for card-level
    /// operations such as [`SdCard::mark_uninitialized`].
    pub fn card(&mut self) -> &mut SdCard<T, D> {
        &mut self.card
    }

    /// Consume the disk and get the card driver back.
    pub fn free(self) -> SdCard<T, D> {
        self.card
    }

    /// Report the state of a unit. Pure state query, no bus I/O.
    pub fn status(&self, unit: u8) -> DiskStatus {
        if unit != self.config.unit {
            return DiskStatus::NotInitialized;
        }
        match self.card.state() {
            CardState::Ready => DiskStatus::Ready,
            CardState::Uninitialized | CardState::Faulted => DiskStatus::NotInitialized,
        }
    }

    /// Run the card's boot sequence and bring the unit online.
    pub fn initialize(&mut self, unit: u8) -> Result<(), DiskError> {
        self.check_unit(unit)?;
        self.card.initialize().map_err(|_e| {
            warn!("card initialisation failed: {:?}", _e);
            DiskError::Io
        })
    }

    /// Read consecutive blocks into the buffer, starting at the given
    /// index.
    ///
    /// Stops at the first block that fails; earlier blocks have already
    /// been filled in by then.
    pub fn read(
        &mut self,
        unit: u8,
        blocks: &mut [Block],
        start: BlockIdx,
    ) -> Result<(), DiskError> {
        self.check_unit(unit)?;
        if blocks.is_empty() {
            return Err(DiskError::InvalidParameter);
        }
        if self.card.state() != CardState::Ready {
            return Err(DiskError::NotReady);
        }
        for (offset, block) in blocks.iter_mut().enumerate() {
            let idx = start + BlockCount(offset as u32);
            self.card.read_block(idx, block).map_err(|_e| {
                warn!("read failed at block {}: {:?}", idx.0, _e);
                DiskError::Io
            })?;
        }
        Ok(())
    }

    /// Write consecutive blocks from the buffer, starting at the given
    /// index.
    ///
    /// Stops at the first block that fails.
    pub fn write(&mut self, unit: u8, blocks: &[Block], start: BlockIdx) -> Result<(), DiskError> {
        self.check_unit(unit)?;
        if blocks.is_empty() {
            return Err(DiskError::InvalidParameter);
        }
        if self.card.state() != CardState::Ready {
            return Err(DiskError::NotReady);
        }
        for (offset, block) in blocks.iter().enumerate() {
            let idx = start + BlockCount(offset as u32);
            self.card.write_block(idx, block).map_err(|_e| {
                warn!("write failed at block {}: {:?}", idx.0, _e);
                DiskError::Io
            })?;
        }
        Ok(())
    }

    /// Answer a geometry or control query from configuration, without
    /// touching the card.
    pub fn control(&self, unit: u8, query: ControlQuery) -> Result<u32, DiskError> {
        self.check_unit(unit)?;
        match query {
            ControlQuery::Sync => Ok(0),
            ControlQuery::SectorSize => Ok(BLOCK_LEN_U32),
            ControlQuery::EraseBlockSize => Ok(1),
            ControlQuery::SectorCount => Ok(self.config.sector_count.0),
            ControlQuery::Trim => Err(DiskError::InvalidParameter),
        }
    }

    fn check_unit(&self, unit: u8) -> Result<(), DiskError> {
        if unit == self.config.unit {
            Ok(())
        } else {
            Err(DiskError::InvalidParameter)
        }
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

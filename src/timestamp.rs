//! The timestamp the filesystem layer stamps on to file metadata.

/// Represents an instant in time, in the local time zone.
///
/// This driver has no real-time clock; the one value the adapter hands out
/// comes from its configuration. See
/// [`current_timestamp`](crate::SdDisk::current_timestamp).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    /// Add 1970 to this field to get the calendar year
    pub year_since_1970: u8,
    /// Add one to this value to get the calendar month
    pub zero_indexed_month: u8,
    /// Add one to this value to get the calendar day
    pub zero_indexed_day: u8,
    /// The number of hours past midnight
    pub hours: u8,
    /// The number of minutes past the hour
    pub minutes: u8,
    /// The number of seconds past the minute
    pub seconds: u8,
}

impl Timestamp {
    /// Create a `Timestamp` from a calendar date and wall-clock time.
    pub fn from_calendar(
        year: u16,
        month: u8,
        day: u8,
        hours: u8,
        minutes: u8,
        seconds: u8,
    ) -> Result<Timestamp, &'static str> {
        if !(1970..=1970 + 255).contains(&year) {
            return Err("year out of range");
        }
        if !(1..=12).contains(&month) {
            return Err("month out of range");
        }
        if !(1..=31).contains(&day) {
            return Err("day out of range");
        }
        if hours > 23 {
            return Err("hours out of range");
        }
        if minutes > 59 {
            return Err("minutes out of range");
        }
        if seconds > 59 {
            return Err("seconds out of range");
        }
        Ok(Timestamp {
            year_since_1970: (year - 1970) as u8,
            zero_indexed_month: month - 1,
            zero_indexed_day: day - 1,
            hours,
            minutes,
            seconds,
        })
    }

    /// Pack into the 32 bit FAT date/time word, date in the high half.
    ///
    /// This is the value a FAT implementation's time hook returns. The FAT
    /// epoch is 1980 and the seconds field has two-second granularity;
    /// years before 1980 pack as 1980.
    pub fn to_fat_datetime(self) -> u32 {
        let year = if self.year_since_1970 < 10 {
            0
        } else {
            (u32::from(self.year_since_1970 - 10) << 25) & 0xFE00_0000
        };
        let month = ((u32::from(self.zero_indexed_month) + 1) << 21) & 0x01E0_0000;
        let day = ((u32::from(self.zero_indexed_day) + 1) << 16) & 0x001F_0000;
        let hours = (u32::from(self.hours) << 11) & 0x0000_F800;
        let minutes = (u32::from(self.minutes) << 5) & 0x0000_07E0;
        let seconds = u32::from(self.seconds / 2) & 0x0000_001F;
        year | month | day | hours | minutes | seconds
    }
}

impl core::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Timestamp({})", self)
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "{}-{:02}-{:02} {:02}:{:02}:{:02}",
            u16::from(self.year_since_1970) + 1970,
            self.zero_indexed_month + 1,
            self.zero_indexed_day + 1,
            self.hours,
            self.minutes,
            self.seconds
        )
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************

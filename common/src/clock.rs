//! Wall-clock time for the sample timestamp.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use log::warn;

use crate::error::TimeSyncError;

/// Stamp written when the clock was never synchronised.
pub const UNSYNCED_TIMESTAMP: &str = "00-00-00 00:00:00";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub trait WallClock {
    /// Current UTC time, or `None` while the clock is not set.
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// Sets the system clock from an NTP server.
pub trait TimeSync {
    fn sync(&mut self, server: &str) -> Result<(), TimeSyncError>;
}

/// Formats timestamps at a fixed regional offset, without daylight saving.
#[derive(Clone, Copy, Debug)]
pub struct Timestamper {
    offset: FixedOffset,
}

impl Timestamper {
    pub fn new(utc_offset_secs: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| {
            warn!("UTC offset {utc_offset_secs}s out of range, using UTC");
            Utc.fix()
        });
        Self { offset }
    }

    pub fn format(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.offset)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    pub fn stamp(&self, clock: &impl WallClock) -> String {
        match clock.now() {
            Some(now) => self.format(now),
            None => {
                warn!("Failed to obtain time");
                UNSYNCED_TIMESTAMP.to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedClock;
    use chrono::TimeZone;

    #[test]
    fn formats_at_fixed_offset() {
        let stamper = Timestamper::new(9 * 3600);
        let time = Utc.with_ymd_and_hms(2024, 12, 31, 20, 15, 7).unwrap();
        assert_eq!(stamper.format(time), "2025-01-01 05:15:07");
    }

    #[test]
    fn unsynced_clock_gets_placeholder() {
        let stamper = Timestamper::new(9 * 3600);
        assert_eq!(stamper.stamp(&FixedClock(None)), UNSYNCED_TIMESTAMP);
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let stamper = Timestamper::new(100 * 3600);
        let time = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(stamper.format(time), "2024-06-01 00:00:00");
    }
}

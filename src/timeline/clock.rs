// Local wall-clock handling
// Converts epoch timestamps to local hours and local date-times back to epochs

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regulatory period a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayPeriod {
    Day,
    Night,
}

impl fmt::Display for DayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayPeriod::Day => write!(f, "day"),
            DayPeriod::Night => write!(f, "night"),
        }
    }
}

/// Time zone used to read the local hour of a timestamp.
///
/// Survey loggers record epoch seconds while the day/night split and the audio
/// file names use the wall clock of the site, so every conversion goes through
/// one explicit zone instead of ambient process state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
    /// Whatever the host reports as local time
    System,

    /// A fixed UTC offset (reproducible across machines)
    Fixed(FixedOffset),
}

impl LocalZone {
    /// Build from an optional offset in minutes east of UTC.
    /// `None` (or an out-of-range offset) selects the system zone.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        let offset = minutes
            .and_then(|m| m.checked_mul(60))
            .and_then(FixedOffset::east_opt);
        match offset {
            Some(offset) => LocalZone::Fixed(offset),
            None => LocalZone::System,
        }
    }

    pub fn utc() -> Self {
        LocalZone::from_offset_minutes(Some(0))
    }

    /// Local hour [0, 24) of an epoch timestamp, `None` if out of chrono's range
    pub fn hour_of(&self, ts: f64) -> Option<u32> {
        let utc = utc_from_epoch(ts)?;
        let hour = match self {
            LocalZone::System => utc.with_timezone(&Local).hour(),
            LocalZone::Fixed(offset) => utc.with_timezone(offset).hour(),
        };
        Some(hour)
    }

    /// Epoch seconds of a local wall-clock date-time.
    /// Ambiguous local times (DST fold) resolve to the earliest instant.
    pub fn epoch_of(&self, local: &NaiveDateTime) -> Option<f64> {
        let seconds = match self {
            LocalZone::System => Local.from_local_datetime(local).earliest()?.timestamp(),
            LocalZone::Fixed(offset) => offset.from_local_datetime(local).earliest()?.timestamp(),
        };
        Some(seconds as f64)
    }
}

impl Default for LocalZone {
    fn default() -> Self {
        LocalZone::System
    }
}

fn utc_from_epoch(ts: f64) -> Option<DateTime<Utc>> {
    if !ts.is_finite() {
        return None;
    }
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Day window in local hours: day is `[start_hour, end_hour)`, night otherwise
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub zone: LocalZone,
}

impl DayWindow {
    pub fn new(start_hour: u32, end_hour: u32, zone: LocalZone) -> Self {
        DayWindow {
            start_hour,
            end_hour,
            zone,
        }
    }

    /// Period of a timestamp. Unrepresentable timestamps count as night.
    pub fn period_of(&self, ts: f64) -> DayPeriod {
        match self.zone.hour_of(ts) {
            Some(h) if h >= self.start_hour && h < self.end_hour => DayPeriod::Day,
            _ => DayPeriod::Night,
        }
    }
}

impl Default for DayWindow {
    fn default() -> Self {
        DayWindow::new(7, 22, LocalZone::System)
    }
}

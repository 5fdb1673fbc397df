//! Schedule evaluation — maps one time sample to a target capacity.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

use crate::config::ScheduleConfig;

/// One consistent reading of the wall clock, taken once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSample {
    pub weekday: Weekday,
    /// Hour of day, `0..=23`.
    pub hour: u8,
}

impl TimeSample {
    pub fn new(weekday: Weekday, hour: u8) -> Self {
        debug_assert!(hour < 24, "hour out of range: {hour}");
        Self { weekday, hour }
    }

    /// Sample weekday and hour from a single instant in its own timezone.
    pub fn from_datetime<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            weekday: now.weekday(),
            hour: now.hour() as u8,
        }
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.weekday, Weekday::Sat | Weekday::Sun)
    }
}

impl fmt::Display for TimeSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}h", self.weekday, self.hour)
    }
}

/// Logical phase of the managed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Capacity above zero.
    Active,
    /// Scaled to zero.
    Dormant,
}

impl Phase {
    pub fn of(capacity: u32) -> Self {
        if capacity == 0 {
            Phase::Dormant
        } else {
            Phase::Active
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Active => f.write_str("active"),
            Phase::Dormant => f.write_str("dormant"),
        }
    }
}

/// Decide the target capacity for `sample`.
///
/// Rules, first match wins:
/// 1. outside `[start, end]` → `0`
/// 2. weekend without consultant mode → `0`
/// 3. `hour >= start` (weekday, or weekend in consultant mode) → `peak`
/// 4. otherwise → `current`
pub fn decide(schedule: &ScheduleConfig, sample: TimeSample, current: u32, peak: u32) -> u32 {
    let hour = sample.hour;

    if hour > schedule.end_hour() || hour < schedule.start_hour() {
        return 0;
    }

    if sample.is_weekend() && !schedule.consultant_mode() {
        return 0;
    }

    if hour >= schedule.start_hour() {
        return peak;
    }

    current
}

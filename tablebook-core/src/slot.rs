//! Wall-clock slot times and calendar-date parsing.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A reservation time at minute precision, rendered as `HH:MM`.
///
/// Slots are exact points, not intervals: "19:00" and "19:30" are distinct
/// slots and distinct peak-hour buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    /// Build a slot from hour and minute. Returns `None` when out of range.
    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(SlotTime)
    }

    /// Truncate an arbitrary time of day to minute precision.
    pub fn from_naive(time: NaiveTime) -> Self {
        let truncated = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
        SlotTime(truncated)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl FromStr for SlotTime {
    type Err = ValidationError;

    /// Accepts strictly `HH:MM` (24-hour clock).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidValue {
            field: "time".to_string(),
            reason: "Invalid time format (HH:mm)".to_string(),
        };
        let s = s.trim();
        let bytes = s.as_bytes();
        if bytes.len() != 5
            || bytes[2] != b':'
            || !bytes[0..2].iter().all(u8::is_ascii_digit)
            || !bytes[3..5].iter().all(u8::is_ascii_digit)
        {
            return Err(invalid());
        }
        let hour: u32 = s[0..2].parse().map_err(|_| invalid())?;
        let minute: u32 = s[3..5].parse().map_err(|_| invalid())?;
        SlotTime::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a calendar day in strict `YYYY-MM-DD` form.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValidationError> {
    let s = s.trim();
    if s.len() != 10 {
        return Err(ValidationError::InvalidValue {
            field: "date".to_string(),
            reason: "Invalid date format (YYYY-MM-DD)".to_string(),
        });
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| ValidationError::InvalidValue {
        field: "date".to_string(),
        reason: "Invalid date format (YYYY-MM-DD)".to_string(),
    })
}

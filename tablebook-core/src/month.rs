//! Calendar-month addressing for reports.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Returns `None` unless `month` is 1..=12 and the year is representable.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { year, month })
    }

    /// The month containing `date`.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the month.
    pub fn start(&self) -> NaiveDate {
        // Constructor guarantees day 1 exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// The following calendar month.
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Half-open date window `[start, next month start)`.
    pub fn window(&self) -> MonthWindow {
        MonthWindow {
            start: self.start(),
            end_exclusive: self.succ().start(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidValue {
            field: "month".to_string(),
            reason: "Invalid month format (YYYY-MM)".to_string(),
        };
        let s = s.trim();
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if year.len() != 4 || month.len() != 2 || !digits(year) || !digits(month) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        YearMonth::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open range of calendar days used for aggregate queries.
///
/// A date belongs to the window iff `start <= date < end_exclusive`. This is
/// what keeps the 28th of February out of March and the 31st out of a 30-day
/// month's successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

impl MonthWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end_exclusive
    }

    /// Last calendar day inside the window.
    pub fn last_day(&self) -> NaiveDate {
        self.end_exclusive.pred_opt().unwrap_or(self.start)
    }

    /// A window is closed once `today` is past its last day; its history no
    /// longer receives new reservations dated inside it.
    pub fn is_closed(&self, today: NaiveDate) -> bool {
        today >= self.end_exclusive
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every day belongs to exactly one month window: its own.
        #[test]
        fn prop_each_day_in_exactly_its_month(days in 0i64..20_000) {
            let date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()
                + chrono::Duration::days(days);
            let own = YearMonth::of(date);
            prop_assert!(own.window().contains(date));
            prop_assert!(!own.succ().window().contains(date));
            let prev_start = own.start().pred_opt().unwrap();
            prop_assert!(!YearMonth::of(prev_start).window().contains(date));
        }

        #[test]
        fn prop_display_parse_roundtrip(year in 1900i32..2200, month in 1u32..=12) {
            let ym = YearMonth::new(year, month).unwrap();
            let parsed: YearMonth = ym.to_string().parse().unwrap();
            prop_assert_eq!(parsed, ym);
        }
    }
}

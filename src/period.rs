//! Calendar months of the 2020 reporting window and the date keys used by
//! the cumulative source tables.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CovidError, Result};

/// Year covered by every source table.
pub const REPORT_YEAR: i32 = 2020;

/// March through July 2020.
pub const REPORTING_WINDOW: MonthWindow = MonthWindow {
    start: Period(3),
    end: Period(7),
};

/// A calendar month of [`REPORT_YEAR`], numbered 1-12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Period(u8);

impl Period {
    pub fn new(month: u8) -> Result<Self> {
        if (1..=12).contains(&month) {
            Ok(Self(month))
        } else {
            Err(CovidError::InvalidPeriod(month))
        }
    }

    pub fn month(self) -> u8 {
        self.0
    }

    /// Full English month name, e.g. `"March"`.
    pub fn name(self) -> &'static str {
        Month::try_from(self.0).map(|m| m.name()).unwrap_or("")
    }

    /// Day-of-month of the last day of this month in [`REPORT_YEAR`].
    pub fn last_day(self) -> u32 {
        let (year, next) = if self.0 == 12 {
            (REPORT_YEAR + 1, 1)
        } else {
            (REPORT_YEAR, u32::from(self.0) + 1)
        };
        // month is always 1-12 here
        NaiveDate::from_ymd_opt(year, next, 1)
            .and_then(|d| d.pred_opt())
            .map_or(28, |d| d.day())
    }

    /// Header text of the cumulative column for the last day of this month,
    /// e.g. `"3/31/20"`.
    pub fn date_key(self) -> String {
        format!("{}/{}/{}", self.0, self.last_day(), REPORT_YEAR % 100)
    }
}

impl TryFrom<u8> for Period {
    type Error = CovidError;

    fn try_from(month: u8) -> Result<Self> {
        Period::new(month)
    }
}

impl From<Period> for u8 {
    fn from(period: Period) -> u8 {
        period.0
    }
}

impl FromStr for Period {
    type Err = CovidError;

    fn from_str(s: &str) -> Result<Self> {
        let month: u8 = s
            .trim()
            .parse()
            .map_err(|_| CovidError::InvalidPeriod(0))?;
        Period::new(month)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of months whose cumulative readings are differenced.
///
/// The month before `start` supplies the seed reading, so `start` must be
/// February or later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    start: Period,
    end: Period,
}

impl MonthWindow {
    pub fn new(start: u8, end: u8) -> Result<Self> {
        let start = Period::new(start)?;
        let end = Period::new(end)?;
        if start.0 < 2 {
            return Err(CovidError::InvalidPeriod(start.0));
        }
        if end < start {
            return Err(CovidError::InvalidPeriod(end.0));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Period {
        self.start
    }

    pub fn end(&self) -> Period {
        self.end
    }

    /// Month whose cumulative reading seeds the first delta.
    pub fn seed(&self) -> Period {
        Period(self.start.0 - 1)
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + use<> {
        (self.start.0..=self.end.0).map(Period)
    }

    /// Date keys of the seed month followed by every month in the window.
    pub fn date_keys(&self) -> Vec<String> {
        (self.seed().0..=self.end.0)
            .map(|m| Period(m).date_key())
            .collect()
    }

    pub fn contains(&self, period: Period) -> bool {
        self.start <= period && period <= self.end
    }

    pub fn month_count(&self) -> usize {
        usize::from(self.end.0 - self.start.0) + 1
    }
}

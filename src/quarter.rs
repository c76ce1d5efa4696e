//! Calendar quarters and their quarter-end dates.

use crate::error::InvalidQuarterError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// A calendar quarter such as `2019 Q4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    quarter: u8,
}

impl Quarter {
    /// Returns the quarter a date falls in.
    pub fn containing(date: NaiveDate) -> Quarter {
        Quarter {
            year: date.year(),
            quarter: (date.month0() / 3 + 1) as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn number(&self) -> u8 {
        self.quarter
    }

    /// Last calendar day of the quarter.
    pub fn end_date(&self) -> NaiveDate {
        let (month, day) = match self.quarter {
            1 => (3, 31),
            2 => (6, 30),
            3 => (9, 30),
            _ => (12, 31),
        };
        // year is limited to four digits on parse, which chrono always covers
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MAX)
    }
}

impl FromStr for Quarter {
    type Err = InvalidQuarterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidQuarterError(s.to_string());

        let (year, token) = s.split_once(' ').ok_or_else(invalid)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let quarter = match token {
            "Q1" => 1,
            "Q2" => 2,
            "Q3" => 3,
            "Q4" => 4,
            _ => return Err(invalid()),
        };
        let year = year.parse::<i32>().map_err(|_| invalid())?;

        Ok(Quarter { year, quarter })
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Q{}", self.year, self.quarter)
    }
}

/// Parses a quarter label and returns its quarter-end date.
pub fn quarter_end(label: &str) -> Result<NaiveDate, InvalidQuarterError> {
    label.parse::<Quarter>().map(|q| q.end_date())
}

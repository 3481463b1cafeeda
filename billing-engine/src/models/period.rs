//! Statement period: the (year, month) a recurring invoice covers.

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use engine_core::error::AppError;
use std::fmt;
use std::str::FromStr;

/// A statement period, keyed canonically as `YYYY-MM`.
///
/// The derived ordering is calendar order because `year` precedes `month`
/// in the struct. This string is the sole key linking invoices and
/// installments across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatementPeriod {
    year: i32,
    month: u32,
}

impl StatementPeriod {
    /// Build a period, rejecting months outside 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self, AppError> {
        if !(1..=12).contains(&month) {
            return Err(AppError::InvalidData(anyhow!(
                "invalid statement month {month} in {year}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The period containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
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

    /// The period `months` calendar months after this one.
    pub fn plus_months(&self, months: u32) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) + months as i32;
        Self {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn next(&self) -> Self {
        self.plus_months(1)
    }

    pub fn prev(&self) -> Self {
        let total = self.year * 12 + (self.month as i32 - 1) - 1;
        Self {
            year: total.div_euclid(12),
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }
}

impl fmt::Display for StatementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for StatementPeriod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| AppError::InvalidData(anyhow!("invalid statement period '{s}'")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| AppError::InvalidData(anyhow!("invalid statement period '{s}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| AppError::InvalidData(anyhow!("invalid statement period '{s}'")))?;
        Self::new(year, month)
    }
}

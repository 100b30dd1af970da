//! Relative date and month input.
//!
//! Dates accept `""` (today), `-N` (N days ago), `D` (day of this month),
//! `M/D` or `M-D` (this year) and `Y/M/D` or `Y-M-D`. Months accept `""` (no
//! month), `-N` (N months ago), `M` (month of this year), `YYYYMM` and
//! `Y/M` or `Y-M`.

use std::fmt;

use chrono::{Datelike, Duration, Local, NaiveDate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("not a number: '{0}'")]
    NotANumber(String),

    #[error("invalid date: '{0}'")]
    InvalidDate(String),

    #[error("invalid month: '{0}'")]
    InvalidMonth(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Persisted form: `year * 100 + month`.
    pub fn to_int(self) -> i64 {
        self.year as i64 * 100 + self.month as i64
    }

    pub fn from_int(value: i64) -> Option<Self> {
        let year = i32::try_from(value / 100).ok()?;
        Self::new(year, (value % 100) as u32)
    }

    pub fn minus_months(self, n: u32) -> Self {
        let total = self.year as i64 * 12 + (self.month as i64 - 1) - n as i64;
        Self {
            year: total.div_euclid(12) as i32,
            month: total.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn number(s: &str) -> Result<i64, DateError> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| DateError::NotANumber(s.to_string()))
}

fn split_parts(s: &str) -> Vec<&str> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() == 1 {
        s.split('/').collect()
    } else {
        parts
    }
}

fn ymd(year: i64, month: i64, day: i64, raw: &str) -> Result<NaiveDate, DateError> {
    let invalid = || DateError::InvalidDate(raw.to_string());
    let year = i32::try_from(year).map_err(|_| invalid())?;
    let month = u32::try_from(month).map_err(|_| invalid())?;
    let day = u32::try_from(day).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

pub fn parse_date(s: &str, today: NaiveDate) -> Result<NaiveDate, DateError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(today);
    }

    if let Some(rest) = s.strip_prefix('-') {
        let days = number(rest)?;
        if !(0..=1_000_000).contains(&days) {
            return Err(DateError::InvalidDate(s.to_string()));
        }
        return today
            .checked_sub_signed(Duration::days(days))
            .ok_or_else(|| DateError::InvalidDate(s.to_string()));
    }

    if let Ok(day) = s.parse::<i64>() {
        return ymd(today.year() as i64, today.month() as i64, day, s);
    }

    let parts = split_parts(s);
    let nums = parts
        .iter()
        .map(|p| number(p))
        .collect::<Result<Vec<_>, _>>()?;
    match nums.as_slice() {
        [m, d] => ymd(today.year() as i64, *m, *d, s),
        [y, m, d] => ymd(*y, *m, *d, s),
        _ => Err(DateError::InvalidDate(s.to_string())),
    }
}

pub fn parse_month(s: &str, today: NaiveDate) -> Result<Option<YearMonth>, DateError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }

    let invalid = || DateError::InvalidMonth(s.to_string());
    let this_month = YearMonth::of(today);

    if let Some(rest) = s.strip_prefix('-') {
        let n = u32::try_from(number(rest)?).map_err(|_| invalid())?;
        return Ok(Some(this_month.minus_months(n)));
    }

    if let Ok(v) = s.parse::<i64>() {
        let year = today.year() as i64;
        let ym = if v > (year - 100) * 100 && v < (year + 100) * 100 {
            YearMonth::from_int(v)
        } else {
            u32::try_from(v)
                .ok()
                .and_then(|m| YearMonth::new(this_month.year, m))
        };
        return ym.map(Some).ok_or_else(invalid);
    }

    let parts = split_parts(s);
    let nums = parts
        .iter()
        .map(|p| number(p))
        .collect::<Result<Vec<_>, _>>()?;
    match nums.as_slice() {
        [y, m] => {
            let year = i32::try_from(*y).map_err(|_| invalid())?;
            let month = u32::try_from(*m).map_err(|_| invalid())?;
            YearMonth::new(year, month).map(Some).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};

/// A calendar month counted from January of year zero (`year * 12 + month - 1`).
///
/// Key file names carry it as a 6-digit `YYYYMM` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthIndex(i32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a 6-digit YYYYMM month")]
pub struct InvalidMonth(pub String);

impl MonthIndex {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return None;
        }
        Some(Self(year * 12 + month as i32 - 1))
    }

    /// The current UTC month.
    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.year() * 12 + date.month0() as i32)
    }

    pub fn year(&self) -> i32 {
        self.0.div_euclid(12)
    }

    /// Month of the year, `1..=12`.
    pub fn month(&self) -> u32 {
        self.0.rem_euclid(12) as u32 + 1
    }

    pub fn offset(&self, months: i32) -> Self {
        Self(self.0 + months)
    }

    /// Whole months elapsed from `earlier` to `self`. Negative if `earlier` lies ahead.
    pub fn months_since(&self, earlier: MonthIndex) -> i32 {
        self.0 - earlier.0
    }
}

impl FromStr for MonthIndex {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidMonth(s.to_string()));
        }
        let year: i32 = s[..4].parse().map_err(|_| InvalidMonth(s.to_string()))?;
        let month: u32 = s[4..].parse().map_err(|_| InvalidMonth(s.to_string()))?;
        Self::new(year, month).ok_or_else(|| InvalidMonth(s.to_string()))
    }
}

impl Display for MonthIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year(), self.month())
    }
}

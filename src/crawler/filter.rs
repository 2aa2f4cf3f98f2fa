//! Date window filtering
//!
//! Records are kept when the calendar date of their creation time, seen in the
//! run's day boundary time zone, falls inside an inclusive window.

use crate::record::Record;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Inclusive calendar-date bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl CrawlWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True when the window cannot exclude anything
    pub fn is_unbounded(&self) -> bool {
        self.start == NaiveDate::MIN && self.end == NaiveDate::MAX
    }
}

impl Default for CrawlWindow {
    fn default() -> Self {
        Self::new(NaiveDate::MIN, NaiveDate::MAX)
    }
}

/// Time zone that decides where one calendar day ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl DayBoundary {
    /// Calendar date of an instant in this zone
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Utc => instant.date_naive(),
            Self::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// Today's date in this zone
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

impl FromStr for DayBoundary {
    type Err = String;

    /// Accepts `local`, `utc` or a fixed `±HH:MM` offset
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "local" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::Utc),
            _ => {}
        }

        let invalid = || format!("invalid time zone '{}' (expected local, utc or ±HH:MM)", s);

        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        if hours.len() != 2 || minutes.len() != 2 {
            return Err(invalid());
        }
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for DayBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Utc => write!(f, "utc"),
            Self::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// Pure predicate over a record's creation date
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFilter {
    window: CrawlWindow,
    zone: DayBoundary,
}

impl RecordFilter {
    pub fn new(window: CrawlWindow, zone: DayBoundary) -> Self {
        Self { window, zone }
    }

    pub fn window(&self) -> &CrawlWindow {
        &self.window
    }

    pub fn include(&self, record: &Record) -> bool {
        self.window.contains(self.zone.date_of(record.created_at))
    }
}

//! Day baselines, day-file names, and second formatting.
//!
//! A day baseline is the unix second of midnight for the day containing a
//! timestamp. Whether that midnight is local or UTC is selected by
//! [`DayBoundary`]; everything else in the engine works on plain `i64`
//! unix seconds.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Number of seconds covered by one day file.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Extension of day files inside the storage directory.
pub const DAY_FILE_EXTENSION: &str = "bin";

/// Which midnight partitions records into day files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBoundary {
    /// Midnight in the process's local time zone.
    #[default]
    Local,
    /// Midnight UTC.
    Utc,
}

impl DayBoundary {
    /// Returns the baseline of the day containing `second`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTimestamp`] if `second` is outside the
    /// calendar range chrono can represent.
    pub fn day_baseline(self, second: i64) -> Result<i64> {
        match self {
            Self::Utc => Ok(second.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY),
            Self::Local => {
                let date = Local
                    .timestamp_opt(second, 0)
                    .single()
                    .ok_or(EngineError::InvalidTimestamp { second })?
                    .date_naive();
                local_midnight(date).ok_or_else(|| EngineError::InvalidTimestamp { second }.into())
            }
        }
    }

    /// Returns the baseline of the calendar day after the one starting at
    /// `baseline`.
    ///
    /// Local days are not always 86400 seconds long, so this walks the
    /// calendar instead of adding a fixed offset.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTimestamp`] at the end of the calendar.
    pub fn next_day_baseline(self, baseline: i64) -> Result<i64> {
        match self {
            Self::Utc => baseline
                .checked_add(SECONDS_PER_DAY)
                .ok_or_else(|| EngineError::InvalidTimestamp { second: baseline }.into()),
            Self::Local => {
                let next = Local
                    .timestamp_opt(baseline, 0)
                    .single()
                    .and_then(|dt| dt.date_naive().succ_opt())
                    .ok_or(EngineError::InvalidTimestamp { second: baseline })?;
                local_midnight(next)
                    .ok_or_else(|| EngineError::InvalidTimestamp { second: baseline }.into())
            }
        }
    }

    /// Renders `second` with a strftime `format` in this boundary's zone.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTimestamp`] if the second cannot be
    /// placed on the calendar or the format fails to render.
    pub fn format_second(self, second: i64, format: &str) -> Result<String> {
        let invalid = || EngineError::InvalidTimestamp { second };
        let mut out = String::new();
        let rendered = match self {
            Self::Utc => {
                let dt = DateTime::<Utc>::from_timestamp(second, 0).ok_or_else(invalid)?;
                write!(out, "{}", dt.format(format))
            }
            Self::Local => {
                let dt = Local.timestamp_opt(second, 0).single().ok_or_else(invalid)?;
                write!(out, "{}", dt.format(format))
            }
        };
        rendered.map_err(|_| invalid())?;
        Ok(out)
    }
}

/// First valid local instant of `date`.
///
/// Some zones skip midnight on DST changes; the earliest existing hour of
/// the day is used instead.
fn local_midnight(date: NaiveDate) -> Option<i64> {
    (0..24).find_map(|hour| {
        let naive: NaiveDateTime = date.and_hms_opt(hour, 0, 0)?;
        match Local.from_local_datetime(&naive) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.timestamp()),
            LocalResult::None => None,
        }
    })
}

/// Returns true if `format` is a usable strftime format string.
pub fn is_valid_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Returns the file name of the day file for `baseline`.
pub fn file_name(baseline: i64) -> String {
    format!("{baseline}.{DAY_FILE_EXTENSION}")
}

/// Extracts the day baseline embedded in a day-file name.
///
/// Returns `None` for anything that is not `{signed integer}.bin`.
pub fn parse_file_name(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(DAY_FILE_EXTENSION)?.strip_suffix('.')?;
    stem.parse::<i64>().ok()
}

/// Converts any chrono date-time to unix seconds, dropping sub-second parts.
pub fn unix_seconds<Tz: TimeZone>(at: &DateTime<Tz>) -> i64 {
    at.timestamp()
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

//! Key types for range query results.
//!
//! A range query returns one entry per populated second. The key of each
//! entry is either the raw epoch second in some integer type or a calendar
//! string rendered with the engine's key format.

use crate::error::{EngineError, Result};
use crate::timeline::DayBoundary;

/// How string keys are rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormatter {
    format: String,
    boundary: DayBoundary,
}

impl KeyFormatter {
    /// Creates a formatter using `format` in the zone of `boundary`.
    pub fn new(format: impl Into<String>, boundary: DayBoundary) -> Self {
        Self {
            format: format.into(),
            boundary,
        }
    }

    /// Returns the strftime format string.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Renders a unix second as a calendar string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTimestamp`] if the second cannot be rendered.
    pub fn render(&self, second: i64) -> Result<String> {
        self.boundary.format_second(second, &self.format)
    }
}

/// A type usable as the key of a range query result.
pub trait SecondKey: Ord + Sized {
    /// Builds the key for the given unix second.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidKey`] if the second does not fit the
    /// key type.
    fn from_second(second: i64, formatter: &KeyFormatter) -> Result<Self>;
}

impl SecondKey for String {
    fn from_second(second: i64, formatter: &KeyFormatter) -> Result<Self> {
        formatter.render(second)
    }
}

impl SecondKey for i64 {
    fn from_second(second: i64, _formatter: &KeyFormatter) -> Result<Self> {
        Ok(second)
    }
}

macro_rules! narrowing_second_key {
    ($($ty:ty),*) => {
        $(
            impl SecondKey for $ty {
                fn from_second(second: i64, _formatter: &KeyFormatter) -> Result<Self> {
                    <$ty>::try_from(second).map_err(|_| {
                        EngineError::InvalidKey {
                            second,
                            key_type: stringify!($ty),
                        }
                        .into()
                    })
                }
            }
        )*
    };
}

narrowing_second_key!(u64, i32, u32);

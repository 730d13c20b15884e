//! Engine configuration.
//!
//! Configuration happens at engine construction time and fixes where day
//! files live, how long they are kept, and how range query keys are rendered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::timeline::{self, DayBoundary};

/// One day.
pub const ONE_DAY: Duration = Duration::from_secs(86_400);
/// Seven days, the default retention.
pub const SEVEN_DAYS: Duration = Duration::from_secs(7 * 86_400);
/// Fourteen days.
pub const FOURTEEN_DAYS: Duration = Duration::from_secs(14 * 86_400);
/// Thirty days.
pub const THIRTY_DAYS: Duration = Duration::from_secs(30 * 86_400);
/// 365 days.
pub const ONE_YEAR: Duration = Duration::from_secs(365 * 86_400);
/// A hundred 365-day years; effectively "keep forever".
pub const HUNDRED_YEARS: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Default storage directory, relative to the working directory.
pub const DEFAULT_DIRECTORY: &str = "./data";

/// Default format of string range keys.
pub const DEFAULT_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configuration of a single [`Engine`](crate::Engine).
///
/// # Example
///
/// ```rust
/// use daystore::config::{EngineConfig, FOURTEEN_DAYS};
/// use daystore::timeline::DayBoundary;
///
/// let config = EngineConfig::new("./snapsdata/proc")
///     .with_retention(FOURTEEN_DAYS)
///     .with_key_format("%H:%M:%S")
///     .with_day_boundary(DayBoundary::Utc);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the day files. Created if missing.
    pub directory: PathBuf,

    /// Maximum age of a day file, measured from its baseline, before it is
    /// evicted.
    pub retention: Duration,

    /// strftime format used for `String` keys of range queries.
    pub key_format: String,

    /// Which midnight partitions records into day files.
    pub day_boundary: DayBoundary,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            retention: SEVEN_DAYS,
            key_format: DEFAULT_KEY_FORMAT.to_string(),
            day_boundary: DayBoundary::Local,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration for `directory` with default settings.
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the retention duration.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Sets the strftime format of string range keys.
    #[must_use]
    pub fn with_key_format(mut self, format: impl Into<String>) -> Self {
        self.key_format = format.into();
        self
    }

    /// Sets the day boundary.
    #[must_use]
    pub fn with_day_boundary(mut self, boundary: DayBoundary) -> Self {
        self.day_boundary = boundary;
        self
    }

    /// Loads a configuration from a JSON file and validates it.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] or [`ConfigError::FileParse`] if the
    /// file cannot be loaded, or any validation error.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|e| ConfigError::FileParse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRetention`] or
    /// [`ConfigError::InvalidKeyFormat`].
    pub fn validate(&self) -> Result<()> {
        if self.retention.is_zero() {
            return Err(ConfigError::ZeroRetention.into());
        }

        if !timeline::is_valid_format(&self.key_format) {
            return Err(ConfigError::InvalidKeyFormat {
                format: self.key_format.clone(),
                reason: "empty or contains unknown specifiers".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Retention in whole seconds, saturating at `i64::MAX`.
    pub(crate) fn retention_secs(&self) -> i64 {
        i64::try_from(self.retention.as_secs()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.directory, PathBuf::from("./data"));
        assert_eq!(config.retention, SEVEN_DAYS);
        assert_eq!(config.key_format, "%Y-%m-%d %H:%M:%S");
        assert_eq!(config.day_boundary, DayBoundary::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retention_constants() {
        assert_eq!(SEVEN_DAYS, ONE_DAY * 7);
        assert_eq!(FOURTEEN_DAYS, ONE_DAY * 14);
        assert_eq!(THIRTY_DAYS, ONE_DAY * 30);
        assert_eq!(ONE_YEAR, ONE_DAY * 365);
        assert_eq!(HUNDRED_YEARS, ONE_YEAR * 100);
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = EngineConfig::new("/tmp/x").with_retention(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_bad_key_format_rejected() {
        assert!(EngineConfig::new("/tmp/x").with_key_format("").validate().is_err());
        assert!(
            EngineConfig::new("/tmp/x")
                .with_key_format("%Y-%Q")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_from_json_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daystore.json");
        std::fs::write(
            &path,
            r#"{ "directory": "/var/lib/snaps", "day_boundary": "utc" }"#,
        )
        .unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.directory, PathBuf::from("/var/lib/snaps"));
        assert_eq!(config.day_boundary, DayBoundary::Utc);
        assert_eq!(config.retention, SEVEN_DAYS);
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = tempdir().unwrap();
        let missing = EngineConfig::from_json_file(dir.path().join("missing.json"));
        assert!(missing.is_err());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ invalid json }").unwrap();
        let err = EngineConfig::from_json_file(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig::new("/data").with_retention(THIRTY_DAYS);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

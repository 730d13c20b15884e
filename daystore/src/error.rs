//! Error types for the daystore record engine.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all daystore operations.
///
/// Each variant wraps the error family of one layer of the engine, so callers
/// can match on the layer (`DayStoreError::DayFile(..)`) or use the kind
/// predicates below when they only care about the failure class.
#[derive(Error, Debug)]
pub enum DayStoreError {
    /// Error raised by the engine (directory, registry, query dispatch).
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Error raised by a single day file.
    #[error("day file error: {0}")]
    DayFile(#[from] DayFileError),

    /// Error encoding or decoding a record payload.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Error validating or loading engine configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DayStoreError {
    /// Returns true if the requested day file does not exist on disk.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Engine(EngineError::NotFound { .. }))
    }

    /// Returns true if the engine was disposed before or during the call.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Engine(EngineError::Disposed))
    }

    /// Returns true if a second fell outside a day file's window.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::DayFile(DayFileError::OutOfRange { .. }))
    }

    /// Returns true for malformed caller input (time ranges, keys, config).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::Engine(EngineError::InvalidTimeRange { .. })
                | Self::Engine(EngineError::InvalidKey { .. })
                | Self::Engine(EngineError::InvalidTimestamp { .. })
                | Self::Config(_)
        )
    }

    /// Returns true for the internal "no file for this day" signal.
    pub(crate) fn is_file_not_hit(&self) -> bool {
        matches!(self, Self::Engine(EngineError::FileNotHit { .. }))
    }

    /// Returns true if the day file handle was closed underneath the caller.
    pub(crate) fn is_closed(&self) -> bool {
        matches!(self, Self::DayFile(DayFileError::Closed { .. }))
    }
}

/// Errors raised by the engine layer.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The storage directory could not be created or accessed.
    #[error("failed to access storage directory '{}': {source}", path.display())]
    DirectoryAccess {
        /// The directory that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another live engine already owns this storage directory.
    #[error("storage directory '{}' is already owned by a live engine", path.display())]
    DirectoryInUse {
        /// The contested directory.
        path: PathBuf,
    },

    /// The range query end lies before its begin.
    #[error("invalid time range: end {end} is before begin {begin}")]
    InvalidTimeRange {
        /// Range begin, unix seconds.
        begin: i64,
        /// Range end, unix seconds.
        end: i64,
    },

    /// An epoch second cannot be represented in the requested key type.
    #[error("second {second} cannot be represented as a {key_type} key")]
    InvalidKey {
        /// The second being converted.
        second: i64,
        /// Name of the key type.
        key_type: &'static str,
    },

    /// The timestamp cannot be placed on the calendar.
    #[error("timestamp {second} is outside the supported calendar range")]
    InvalidTimestamp {
        /// The rejected unix second.
        second: i64,
    },

    /// No day file exists for the requested day.
    #[error("day file '{}' not found", path.display())]
    NotFound {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// The queried day has no file yet.
    #[error("no day file for baseline {baseline}")]
    FileNotHit {
        /// The day baseline that was looked up.
        baseline: i64,
    },

    /// The engine has been disposed.
    #[error("engine has been disposed")]
    Disposed,
}

/// Errors raised by a single day file.
#[derive(Error, Debug)]
pub enum DayFileError {
    /// The second lies outside the day file's 86400-second window.
    #[error("second {second} is outside the day window starting at {baseline}")]
    OutOfRange {
        /// The rejected second.
        second: i64,
        /// The day baseline of the file.
        baseline: i64,
    },

    /// The file handle was already released.
    #[error("day file '{}' is closed", path.display())]
    Closed {
        /// The closed file.
        path: PathBuf,
    },

    /// The header or layout of the file is invalid.
    #[error("day file '{}' is corrupted: {reason}", path.display())]
    Corrupted {
        /// The corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// An append would place a frame beyond the 32-bit offset space.
    #[error("day file '{}' is full: appending {needed} bytes at offset {offset} exceeds u32 offsets", path.display())]
    CapacityExceeded {
        /// The full file.
        path: PathBuf,
        /// Current end of the data region.
        offset: u64,
        /// Bytes the batch needed.
        needed: u64,
    },

    /// Failed to read from the file.
    #[error("failed to read day file '{}' at offset {offset}: {source}", path.display())]
    ReadFailed {
        /// The file path.
        path: PathBuf,
        /// The byte offset where the read failed.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to the file.
    #[error("failed to write day file '{}' at offset {offset}: {source}", path.display())]
    WriteFailed {
        /// The file path.
        path: PathBuf,
        /// The byte offset where the write failed.
        offset: u64,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush the file to disk.
    #[error("failed to sync day file '{}': {source}", path.display())]
    SyncFailed {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Mapping the index table failed.
    #[error("memory mapping failed for day file '{}': {source}", path.display())]
    MemoryMap {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Removing the file from disk failed.
    #[error("failed to remove day file '{}': {source}", path.display())]
    RemoveFailed {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while turning records into payload bytes and back.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The record could not be encoded.
    #[error("failed to encode record: {reason}")]
    Encode {
        /// Why encoding failed.
        reason: String,
    },

    /// The payload could not be decoded.
    #[error("failed to decode record: {reason}")]
    Decode {
        /// Why decoding failed.
        reason: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("json codec failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while validating or loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Retention must be greater than zero.
    #[error("retention must be greater than zero")]
    ZeroRetention,

    /// The range key format is empty or contains invalid specifiers.
    #[error("invalid key format '{format}': {reason}")]
    InvalidKeyFormat {
        /// The rejected format string.
        format: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The sweep interval must be greater than zero.
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,

    /// The config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    FileRead {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`crate::EngineConfig`].
    #[error("failed to parse config file '{}': {source}", path.display())]
    FileParse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, DayStoreError>`.
pub type Result<T> = std::result::Result<T, DayStoreError>;

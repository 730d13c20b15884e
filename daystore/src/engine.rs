//! The day-partitioned record engine.
//!
//! An [`Engine`] owns one storage directory and the day files inside it. It
//! resolves every timestamp to its day baseline, hands the work to the
//! matching [`DayFile`], and keeps the open files in a small cache.
//!
//! # Locking
//!
//! The cache lock is held to look up or create a file handle, and across a
//! whole eviction. All record I/O happens under the day file's own lock after
//! the cache lock has been released. Eviction closes the file, which waits for
//! any append or traversal still running on it, and unlinks it before the
//! cache lock is dropped. A caller whose handle was closed resolves again.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use parking_lot::Mutex;

use crate::codec::RecordCodec;
use crate::config::EngineConfig;
use crate::dayfile::{DayFile, FrameHeader};
use crate::error::{DayFileError, EngineError, Result};
use crate::key::{KeyFormatter, SecondKey};
use crate::registry::Registry;
use crate::timeline::{self, unix_seconds};

/// Type-independent state of an engine, shared with the registry.
#[derive(Debug)]
pub(crate) struct EngineCore {
    config: EngineConfig,
    files: Mutex<HashMap<i64, Arc<DayFile>>>,
    disposed: AtomicBool,
}

impl EngineCore {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            files: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(EngineError::Disposed.into());
        }
        Ok(())
    }

    fn baseline(&self, second: i64) -> Result<i64> {
        self.config.day_boundary.day_baseline(second)
    }

    fn day_path(&self, baseline: i64) -> PathBuf {
        self.config.directory.join(timeline::file_name(baseline))
    }

    /// Returns the cached handle for `baseline`, opening or creating the
    /// file as needed.
    ///
    /// Fails with [`EngineError::FileNotHit`] if the file is absent and
    /// `create` is false.
    fn resolve(&self, baseline: i64, create: bool) -> Result<Arc<DayFile>> {
        let mut files = self.files.lock();
        // Checked under the cache lock so nothing is cached after dispose
        // drained it.
        self.ensure_live()?;

        if let Some(file) = files.get(&baseline) {
            return Ok(Arc::clone(file));
        }

        let path = self.day_path(baseline);
        let file = if path.exists() {
            let file = DayFile::open(&path)?;
            if file.baseline() != baseline {
                return Err(DayFileError::Corrupted {
                    path,
                    reason: format!(
                        "header baseline {} does not match file name baseline {baseline}",
                        file.baseline()
                    ),
                }
                .into());
            }
            file
        } else if create {
            DayFile::create(&path, baseline)?
        } else {
            return Err(EngineError::FileNotHit { baseline }.into());
        };

        let file = Arc::new(file);
        files.insert(baseline, Arc::clone(&file));
        Ok(file)
    }

    /// Runs `op` against the day file for `baseline`.
    ///
    /// A handle closed underneath the caller by a concurrent eviction is
    /// resolved again until `op` runs on a live handle. Each retry follows a
    /// completed eviction; on a disposed engine the lookup fails with
    /// [`EngineError::Disposed`].
    fn with_file<T>(
        &self,
        baseline: i64,
        create: bool,
        op: impl Fn(&DayFile) -> Result<T>,
    ) -> Result<T> {
        loop {
            let file = self.resolve(baseline, create)?;
            match op(&file) {
                Err(e) if e.is_closed() => continue,
                result => return result,
            }
        }
    }

    /// Closes and deletes the day file for `baseline`.
    ///
    /// The cache lock is held from removal through unlink, so no resolve can
    /// reopen the file in between and at most one handle per day exists.
    /// Closing waits for the append or traversal in flight on the file;
    /// day file operations never take the cache lock.
    fn evict(&self, baseline: i64) -> Result<()> {
        let path = self.day_path(baseline);
        let mut files = self.files.lock();
        if let Some(file) = files.remove(&baseline) {
            release(&file);
        }

        let removed = fs::remove_file(&path);
        drop(files);
        match removed {
            Ok(()) => {
                tracing::info!(path = %path.display(), baseline, "evicted day file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EngineError::NotFound { path }.into()),
            Err(e) => Err(DayFileError::RemoveFailed { path, source: e }.into()),
        }
    }

    fn day_files(&self) -> Result<Vec<i64>> {
        let directory = self.directory();
        let access = |e| EngineError::DirectoryAccess {
            path: directory.to_path_buf(),
            source: e,
        };

        let mut baselines = Vec::new();
        for entry in fs::read_dir(directory).map_err(access)? {
            let entry = entry.map_err(access)?;
            if !entry.file_type().map_err(access)?.is_file() {
                continue;
            }
            if let Some(baseline) = entry.file_name().to_str().and_then(timeline::parse_file_name) {
                baselines.push(baseline);
            }
        }
        baselines.sort_unstable();
        Ok(baselines)
    }

    fn is_expired(&self, second: i64, now: i64) -> Result<bool> {
        let baseline = self.baseline(second)?;
        Ok(now.saturating_sub(baseline) > self.config.retention_secs())
    }

    /// Evicts every day file older than the retention at `now`.
    ///
    /// Failures on individual files are logged and skipped. Returns the
    /// number of files removed.
    pub(crate) fn sweep(&self, now: i64) -> usize {
        if self.is_disposed() {
            return 0;
        }

        let baselines = match self.day_files() {
            Ok(baselines) => baselines,
            Err(e) => {
                tracing::warn!(
                    directory = %self.directory().display(),
                    error = %e,
                    "failed to list storage directory during sweep"
                );
                return 0;
            }
        };

        let mut evicted = 0;
        for baseline in baselines {
            match self.is_expired(baseline, now) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(baseline, error = %e, "cannot age day file, skipping");
                    continue;
                }
            }

            match self.evict(baseline) {
                Ok(()) => evicted += 1,
                // Removed by a concurrent delete.
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    tracing::warn!(baseline, error = %e, "failed to evict expired day file");
                }
            }
        }
        evicted
    }

    /// Marks the core disposed and closes every cached file.
    ///
    /// Returns false if it was already disposed.
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let files: Vec<_> = self.files.lock().drain().map(|(_, file)| file).collect();
        for file in &files {
            release(file);
        }
        true
    }
}

/// Closes a day file, logging anything but a repeated close.
fn release(file: &DayFile) {
    match file.close() {
        Ok(()) => {}
        Err(e) if e.is_closed() => {}
        Err(e) => {
            tracing::warn!(path = %file.path().display(), error = %e, "failed to close day file");
        }
    }
}

/// An embedded store of records of type `R`, one file per day.
///
/// # Thread Safety
///
/// `Engine<R>` is `Send + Sync`. Share it behind an `Arc` to write and query
/// from several threads; writes to the same second are ordered by the day
/// file's lock.
///
/// # Example
///
/// ```rust,no_run
/// use daystore::{Engine, EngineConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine: Engine<String> = Engine::open(EngineConfig::new("./data"))?;
/// engine.write_unix(1_672_531_205, &["A".to_string(), "B".to_string()])?;
/// let records = engine.query_at_unix(1_672_531_205)?;
/// assert_eq!(records, vec!["A".to_string(), "B".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct Engine<R: RecordCodec> {
    core: Arc<EngineCore>,
    registry: Arc<Registry>,
    _record: PhantomData<fn() -> R>,
}

impl<R: RecordCodec> Engine<R> {
    /// Opens an engine on `config.directory`, registered with the
    /// process-wide [`Registry`].
    ///
    /// # Errors
    ///
    /// See [`open_in`](Self::open_in).
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_in(&Registry::global(), config)
    }

    /// Opens an engine registered with `registry`.
    ///
    /// Creates the storage directory if missing and runs one retention sweep
    /// over it before returning.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](crate::error::ConfigError) for an invalid
    /// configuration, [`EngineError::DirectoryAccess`] if the directory
    /// cannot be created, or [`EngineError::DirectoryInUse`] if another live
    /// engine in the same registry owns it.
    pub fn open_in(registry: &Arc<Registry>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let access = |e| EngineError::DirectoryAccess {
            path: config.directory.clone(),
            source: e,
        };
        fs::create_dir_all(&config.directory).map_err(access)?;
        let directory = fs::canonicalize(&config.directory).map_err(access)?;

        let core = Arc::new(EngineCore::new(EngineConfig {
            directory,
            ..config
        }));
        registry.register(&core)?;

        tracing::info!(
            directory = %core.directory().display(),
            retention_secs = core.config.retention_secs(),
            "opened engine"
        );

        Ok(Self {
            core,
            registry: Arc::clone(registry),
            _record: PhantomData,
        })
    }

    /// Appends `records`, in order, under the exact unix second `second`.
    ///
    /// The day file is created on first write into its day. An empty batch
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`], a codec error, or an I/O error.
    ///
    /// With [`DayBoundary::Local`](crate::timeline::DayBoundary::Local), a
    /// day that gains an hour at a daylight saving transition lasts 25 hours
    /// but its file holds only 86 400 slots. Writes into that final hour fail
    /// with [`DayFileError::OutOfRange`].
    pub fn write_unix(&self, second: i64, records: &[R]) -> Result<()> {
        self.core.ensure_live()?;
        if records.is_empty() {
            return Ok(());
        }
        let baseline = self.core.baseline(second)?;
        self.core
            .with_file(baseline, true, |file| file.append(second, records))
    }

    /// Calendar-time form of [`write_unix`](Self::write_unix).
    ///
    /// # Errors
    ///
    /// See [`write_unix`](Self::write_unix).
    pub fn write<Tz: TimeZone>(&self, at: &DateTime<Tz>, records: &[R]) -> Result<()> {
        self.write_unix(unix_seconds(at), records)
    }

    /// Returns the records written at `second`, in write order.
    ///
    /// A day without a file yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`], a codec error, or an I/O error.
    /// The final hour of a 25-hour local day fails with
    /// [`DayFileError::OutOfRange`] as in [`write_unix`](Self::write_unix).
    pub fn query_at_unix(&self, second: i64) -> Result<Vec<R>> {
        self.core.ensure_live()?;
        let baseline = self.core.baseline(second)?;
        match self
            .core
            .with_file(baseline, false, |file| file.traverse(second))
        {
            Err(e) if e.is_file_not_hit() => Ok(Vec::new()),
            result => result,
        }
    }

    /// Calendar-time form of [`query_at_unix`](Self::query_at_unix).
    ///
    /// # Errors
    ///
    /// See [`query_at_unix`](Self::query_at_unix).
    pub fn query_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Result<Vec<R>> {
        self.query_at_unix(unix_seconds(at))
    }

    /// Returns the records of every populated second in `[begin, end]`.
    ///
    /// Keys are built with [`SecondKey`]: `String` keys use the configured
    /// key format, integer keys hold the raw unix second. Seconds without
    /// records are absent. Should a coarse key format map two seconds to the
    /// same key, their records are merged in time order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTimeRange`] if `end < begin`,
    /// [`EngineError::InvalidKey`] if a second does not fit `K`, or any
    /// error of a day file other than a missing one.
    pub fn query_range_unix<K: SecondKey>(
        &self,
        begin: i64,
        end: i64,
    ) -> Result<BTreeMap<K, Vec<R>>> {
        self.core.ensure_live()?;
        if end < begin {
            return Err(EngineError::InvalidTimeRange { begin, end }.into());
        }

        let boundary = self.core.config.day_boundary;
        let formatter = KeyFormatter::new(self.core.config.key_format.clone(), boundary);
        let last = self.core.baseline(end)?;
        let mut baseline = self.core.baseline(begin)?;
        let mut out: BTreeMap<K, Vec<R>> = BTreeMap::new();

        while baseline <= last {
            match self.core.with_file(baseline, false, |file| {
                file.seconds_with_data::<R>(begin, end)
            }) {
                Ok(entries) => {
                    for (second, records) in entries {
                        out.entry(K::from_second(second, &formatter)?)
                            .or_default()
                            .extend(records);
                    }
                }
                Err(e) if e.is_file_not_hit() => {}
                Err(e) => return Err(e),
            }
            baseline = boundary.next_day_baseline(baseline)?;
        }

        Ok(out)
    }

    /// Calendar-time form of [`query_range_unix`](Self::query_range_unix).
    ///
    /// # Errors
    ///
    /// See [`query_range_unix`](Self::query_range_unix).
    pub fn query_range<K: SecondKey, Tz: TimeZone>(
        &self,
        begin: &DateTime<Tz>,
        end: &DateTime<Tz>,
    ) -> Result<BTreeMap<K, Vec<R>>> {
        self.query_range_unix(unix_seconds(begin), unix_seconds(end))
    }

    /// Closes and removes the day file containing `second`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the day has no file on disk,
    /// [`EngineError::Disposed`], or [`DayFileError::RemoveFailed`].
    pub fn delete_day_unix(&self, second: i64) -> Result<()> {
        self.core.ensure_live()?;
        let baseline = self.core.baseline(second)?;
        self.core.evict(baseline)
    }

    /// Calendar-time form of [`delete_day_unix`](Self::delete_day_unix).
    ///
    /// # Errors
    ///
    /// See [`delete_day_unix`](Self::delete_day_unix).
    pub fn delete_day<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Result<()> {
        self.delete_day_unix(unix_seconds(at))
    }

    /// Returns true if the day containing `second` is older than the
    /// retention at `now`: `now - day_baseline(second) > retention`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`] after [`dispose`](Self::dispose),
    /// or [`EngineError::InvalidTimestamp`] if `second` cannot be placed on
    /// the calendar.
    pub fn is_expired(&self, second: i64, now: i64) -> Result<bool> {
        self.core.ensure_live()?;
        self.core.is_expired(second, now)
    }

    /// Calendar-time form of [`is_expired`](Self::is_expired).
    ///
    /// # Errors
    ///
    /// See [`is_expired`](Self::is_expired).
    pub fn is_expired_at<Tz: TimeZone, Tn: TimeZone>(
        &self,
        at: &DateTime<Tz>,
        now: &DateTime<Tn>,
    ) -> Result<bool> {
        self.is_expired(unix_seconds(at), unix_seconds(now))
    }

    /// Returns the frame headers of the chain at `second`, empty if the day
    /// has no file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`] or an I/O error.
    pub fn frames(&self, second: i64) -> Result<Vec<FrameHeader>> {
        self.core.ensure_live()?;
        let baseline = self.core.baseline(second)?;
        match self
            .core
            .with_file(baseline, false, |file| file.frames(second))
        {
            Err(e) if e.is_file_not_hit() => Ok(Vec::new()),
            result => result,
        }
    }

    /// Returns the populated seconds of the day starting at `baseline`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FileNotHit`] if the day has no file, or
    /// [`EngineError::Disposed`].
    pub fn populated_seconds(&self, baseline: i64) -> Result<Vec<i64>> {
        self.core.ensure_live()?;
        self.core
            .with_file(baseline, false, DayFile::populated_seconds)
    }

    /// Returns the sorted baselines of the day files in the directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Disposed`] after [`dispose`](Self::dispose),
    /// or [`EngineError::DirectoryAccess`] if the directory cannot be listed.
    pub fn day_files(&self) -> Result<Vec<i64>> {
        self.core.ensure_live()?;
        self.core.day_files()
    }

    /// Returns the canonical storage directory.
    pub fn storage_directory(&self) -> &Path {
        self.core.directory()
    }

    /// Returns the retention duration.
    pub fn retention(&self) -> Duration {
        self.core.config.retention
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Returns true once the engine has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Closes every open day file and releases the directory.
    ///
    /// Every later operation fails with [`EngineError::Disposed`]. Calling
    /// this more than once is harmless; it also runs on drop.
    pub fn dispose(&self) {
        if self.core.dispose() {
            self.registry.unregister(&self.core);
            tracing::info!(directory = %self.core.directory().display(), "disposed engine");
        }
    }
}

impl<R: RecordCodec> Drop for Engine<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<R: RecordCodec> fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("directory", &self.core.directory())
            .field("retention", &self.core.config.retention)
            .field("disposed", &self.core.is_disposed())
            .finish_non_exhaustive()
    }
}

//! Process-wide bookkeeping of live engines and their retention sweeps.
//!
//! A [`Registry`] maps each canonical storage directory to the engine that
//! owns it and drives one background sweeper thread for all of them. The
//! sweeper starts with the first registration. Use [`Registry::global`] for
//! the shared instance, or [`Registry::new`] for an isolated one with its own
//! interval.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::EngineCore;
use crate::error::{ConfigError, EngineError, Result};
use crate::sweeper::SweeperHandle;
use crate::timeline;

/// Sweep interval of the process-wide registry.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Registry of live engines keyed by storage directory.
#[derive(Debug)]
pub struct Registry {
    interval: Duration,
    engines: Mutex<HashMap<PathBuf, Weak<EngineCore>>>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl Registry {
    /// Creates an isolated registry sweeping every `interval`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroSweepInterval`] for a zero interval.
    pub fn new(interval: Duration) -> Result<Arc<Self>> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval.into());
        }
        Ok(Arc::new(Self::with_interval(interval)))
    }

    fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            engines: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Returns the process-wide registry, created on first use.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_interval(DEFAULT_SWEEP_INTERVAL))))
    }

    /// Returns the sweep interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of live registered engines.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Returns true if no live engine is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the storage directories of the live engines, sorted.
    pub fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<_> = self
            .live()
            .iter()
            .map(|core| core.directory().to_path_buf())
            .collect();
        dirs.sort();
        dirs
    }

    /// Returns true while the background sweeper thread is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().as_ref().is_some_and(SweeperHandle::is_running)
    }

    /// Snapshot of live engines; dead entries are pruned on the way.
    fn live(&self) -> Vec<Arc<EngineCore>> {
        let mut engines = self.engines.lock();
        engines.retain(|_, weak| weak.upgrade().is_some_and(|core| !core.is_disposed()));
        engines.values().filter_map(Weak::upgrade).collect()
    }

    /// Registers `core` under its directory, sweeps it once, and makes sure
    /// the background sweeper is running.
    pub(crate) fn register(self: &Arc<Self>, core: &Arc<EngineCore>) -> Result<()> {
        let directory = core.directory().to_path_buf();
        {
            let mut engines = self.engines.lock();
            let owned = engines
                .get(&directory)
                .and_then(Weak::upgrade)
                .is_some_and(|existing| !existing.is_disposed());
            if owned {
                return Err(EngineError::DirectoryInUse { path: directory }.into());
            }
            engines.insert(directory.clone(), Arc::downgrade(core));
        }

        let evicted = core.sweep(timeline::now_unix());
        if evicted > 0 {
            tracing::info!(directory = %directory.display(), evicted, "removed stale day files");
        }

        self.ensure_sweeper();
        Ok(())
    }

    /// Removes `core` from the registry if it is the registered owner of its
    /// directory.
    pub(crate) fn unregister(&self, core: &Arc<EngineCore>) {
        let mut engines = self.engines.lock();
        let is_owner = engines
            .get(core.directory())
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(core)));
        if is_owner {
            engines.remove(core.directory());
        }
    }

    fn ensure_sweeper(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(SweeperHandle::is_running) {
            return;
        }

        let registry = Arc::downgrade(self);
        let spawned = SweeperHandle::spawn(self.interval, move || {
            let Some(registry) = registry.upgrade() else {
                return false;
            };
            let evicted = registry.sweep_now();
            if evicted > 0 {
                tracing::debug!("retention sweep evicted {evicted} day file(s)");
            }
            true
        });

        match spawned {
            Ok(handle) => *sweeper = Some(handle),
            Err(e) => tracing::warn!(error = %e, "failed to start sweeper thread"),
        }
    }

    /// Runs one retention sweep over every live engine at the current time.
    ///
    /// Returns the number of day files evicted.
    pub fn sweep_now(&self) -> usize {
        self.sweep_at(timeline::now_unix())
    }

    /// Runs one retention sweep as if the current time were `now`.
    ///
    /// Returns the number of day files evicted.
    pub fn sweep_at(&self, now: i64) -> usize {
        self.live().iter().map(|core| core.sweep(now)).sum()
    }

    /// Stops the background sweeper. Registering another engine restarts it.
    pub fn shutdown(&self) {
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

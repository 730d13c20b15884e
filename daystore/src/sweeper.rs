//! Background thread that runs a periodic tick until stopped.
//!
//! The thread sleeps on a condition variable with the interval as timeout,
//! so [`SweeperHandle::stop`] wakes it immediately instead of waiting out
//! the current interval.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a running sweeper thread.
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct SweeperHandle {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawns a thread calling `tick` every `interval` until stopped or until
    /// `tick` returns false.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the thread cannot be spawned.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let thread = thread::Builder::new()
            .name("daystore-sweeper".to_string())
            .spawn(move || {
                loop {
                    {
                        let mut stopped = thread_signal.stopped.lock();
                        if !*stopped {
                            thread_signal.wake.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    if !tick() {
                        break;
                    }
                }
                tracing::debug!("sweeper thread exiting");
            })?;

        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Returns true while the thread is running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wakes the thread, tells it to exit, and waits for it.
    ///
    /// A tick in progress finishes first. Called from the sweeper thread
    /// itself, this only signals.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::warn!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

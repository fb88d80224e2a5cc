//! Primary Dispatcher.
//!
//! Runs on the thread that owns main-thread affinity (the process main
//! thread in the binary). Each iteration:
//!
//! 1. drains the main queue and runs every task,
//! 2. asks the supervisor to check script liveness,
//! 3. sleeps until woken or `poll_interval` elapses.
//!
//! `stop()` clears the running flag, wakes the loop and stops the
//! supervisor; the loop performs one final drain before returning.

use crate::config::DispatcherConfig;
use crate::error::RuntimeError;
use crate::queue::{MainQueue, MainTask};
use crate::supervisor::{Liveness, ScriptEngine, Supervisor};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle operations the dispatcher needs from a supervisor.
///
/// Object-safe so that [`DispatcherHandle`] is not generic over the engine.
pub trait ScriptControl: Send + Sync {
    /// Starts the script if stopped.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the script thread cannot be spawned.
    fn start(&self) -> Result<(), RuntimeError>;

    /// Stops the script and waits for its thread.
    fn stop(&self);

    /// Stop followed by start, clearing the freeze restart budget.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the script thread cannot be spawned.
    fn restart(&self) -> Result<(), RuntimeError>;
}

impl<E: ScriptEngine> ScriptControl for Supervisor<E> {
    fn start(&self) -> Result<(), RuntimeError> {
        Supervisor::start(self)
    }

    fn stop(&self) {
        Supervisor::stop(self);
    }

    fn restart(&self) -> Result<(), RuntimeError> {
        Supervisor::restart(self)
    }
}

/// Cloneable remote control for a [`Dispatcher`], usable from any thread.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: Arc<MainQueue>,
    running: Arc<AtomicBool>,
    control: Arc<dyn ScriptControl>,
}

impl fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl DispatcherHandle {
    /// Schedules `task` on the primary thread.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        let task: MainTask = Box::new(task);
        self.queue.enqueue(task);
    }

    /// Ends the dispatch loop and stops the script.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("Dispatcher stop requested");
        }
        self.queue.wake();
        self.control.stop();
    }

    /// Restarts the script from the primary thread.
    pub fn request_restart(&self) {
        let control = Arc::clone(&self.control);
        self.enqueue(move || {
            info!("Script restart requested");
            if let Err(e) = control.restart() {
                error!(error = %e, "Script restart failed");
            }
        });
    }

    /// Returns `true` until [`stop`](Self::stop) is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// The primary dispatch loop.
pub struct Dispatcher<E: ScriptEngine> {
    supervisor: Supervisor<E>,
    queue: Arc<MainQueue>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl<E: ScriptEngine> Dispatcher<E> {
    /// Creates a dispatcher draining the supervisor's main queue.
    #[must_use]
    pub fn new(supervisor: Supervisor<E>, config: &DispatcherConfig) -> Self {
        let queue = Arc::clone(supervisor.main_queue());
        Self {
            supervisor,
            queue,
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: config.poll_interval(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            queue: Arc::clone(&self.queue),
            running: Arc::clone(&self.running),
            control: Arc::new(self.supervisor.clone()),
        }
    }

    #[must_use]
    pub fn supervisor(&self) -> &Supervisor<E> {
        &self.supervisor
    }

    /// Runs the loop on the calling thread until stopped.
    pub fn run(&self) {
        info!(poll_interval = ?self.poll_interval, "Dispatcher running");
        while self.running.load(Ordering::Acquire) {
            self.drain();
            match self.supervisor.check_liveness() {
                Liveness::Restarted { generation } => {
                    info!(generation, "Script restarted after freeze");
                }
                Liveness::RestartSuppressed | Liveness::RestartFailed => {
                    warn!("Frozen script was not restarted");
                }
                Liveness::Idle | Liveness::Healthy => {}
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.queue.wait(self.poll_interval);
        }

        self.supervisor.stop();
        self.drain();
        info!("Dispatcher stopped");
    }

    /// Ends the loop and stops the script.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.queue.wake();
        self.supervisor.stop();
    }

    /// Runs every queued task. A panicking task is logged and skipped.
    fn drain(&self) {
        let tasks = self.queue.drain_all();
        if tasks.is_empty() {
            return;
        }
        debug!(count = tasks.len(), "Running main-thread tasks");
        for task in tasks {
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                error!("Main-thread task panicked");
            }
        }
    }
}

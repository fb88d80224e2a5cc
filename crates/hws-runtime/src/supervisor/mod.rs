//! Script Supervisor.
//!
//! Owns the script thread and everything that decides whether it lives:
//!
//! - `start()` spawns a thread (named `hws-script`) that instantiates the
//!   script, then alternates between draining the script queue and calling
//!   the tick entry point until told to stop.
//! - `stop()` asks the thread to finish, waits `stop_grace`, cancels the
//!   instance's token and waits `cancel_grace`. A thread that is still alive
//!   after that is abandoned: it keeps its own (cancelled) token and
//!   heartbeat and can never touch its successor.
//! - `check_liveness()` is called by the primary dispatcher. A busy instance
//!   whose heartbeat is older than `freeze_threshold` is cancelled and
//!   restarted, subject to the [`RestartLimiter`].
//!
//! Script errors (setup, tick, tasks) end the instance and are not retried.
//! Only a freeze triggers an automatic restart.
//!
//! # Example
//!
//! ```
//! use hws_runtime::config::SupervisorConfig;
//! use hws_runtime::queue::MainQueue;
//! use hws_runtime::supervisor::{NextTick, Supervisor, SupervisorState};
//! use hws_runtime::testing::{tick_fn, FnEngine};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = FnEngine::new(|_env| Ok(tick_fn(|_elapsed| Ok(NextTick::Stop))));
//! let supervisor = Supervisor::new(engine, SupervisorConfig::default(), Arc::new(MainQueue::new()));
//!
//! supervisor.start().unwrap();
//! while supervisor.state() != SupervisorState::Stopped {
//!     std::thread::sleep(Duration::from_millis(5));
//! }
//! assert_eq!(supervisor.stats().ticks, 1);
//! ```

mod engine;
mod handle;
mod restart;
mod state;
mod thread;

pub use engine::{NextTick, ScriptEngine, ScriptEnv, ScriptInstance, ScriptSender};
pub use handle::ScriptHandle;
pub use restart::RestartLimiter;
pub use state::SupervisorState;

use crate::config::SupervisorConfig;
use crate::error::RuntimeError;
use crate::queue::{CrossThreadQueue, MainQueue};
pub(crate) use engine::{ScriptQueue, Tagged};
use parking_lot::Mutex;
use state::AtomicState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll step while waiting for the script thread to exit.
const REAP_POLL: Duration = Duration::from_millis(5);

/// Script thread name.
pub const SCRIPT_THREAD_NAME: &str = "hws-script";

/// Result of one [`Supervisor::check_liveness`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Not running; nothing to check.
    Idle,
    /// Running and either parked or within the threshold.
    Healthy,
    /// A frozen instance was cancelled and a new one started.
    Restarted { generation: u64 },
    /// A frozen instance was cancelled; the restart budget is exhausted.
    RestartSuppressed,
    /// A frozen instance was cancelled; spawning the replacement failed.
    RestartFailed,
}

/// Supervisor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Restarts triggered by freeze detection.
    pub freeze_restarts: u64,
    /// Instances that ended with a script error or panic.
    pub failures: u64,
    /// Completed tick calls across all instances.
    pub ticks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    freeze_restarts: AtomicU64,
    failures: AtomicU64,
    ticks: AtomicU64,
}

#[derive(Debug, Default)]
struct Control {
    thread: Option<JoinHandle<()>>,
    current: Option<ScriptHandle>,
    last_generation: u64,
}

struct Shared<E: ScriptEngine> {
    engine: E,
    config: SupervisorConfig,
    state: AtomicState,
    script_queue: Arc<ScriptQueue<E::Task>>,
    main_queue: Arc<MainQueue>,
    control: Mutex<Control>,
    limiter: Mutex<RestartLimiter>,
    counters: Counters,
}

impl<E: ScriptEngine> Shared<E> {
    /// Marks `handle` finished if it is still the current instance.
    fn retire(&self, handle: &ScriptHandle) {
        let mut control = self.control.lock();
        if control
            .current
            .as_ref()
            .is_some_and(|current| current.same_instance(handle))
        {
            control.current = None;
            self.state.store(SupervisorState::Stopped);
        }
    }
}

/// Owner of the script thread.
///
/// Cloning yields another handle to the same supervisor.
pub struct Supervisor<E: ScriptEngine> {
    shared: Arc<Shared<E>>,
}

impl<E: ScriptEngine> Clone for Supervisor<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: ScriptEngine> Supervisor<E> {
    /// Creates a stopped supervisor.
    ///
    /// `main_queue` is the primary dispatcher's queue; instances use it to
    /// schedule work with main-thread affinity.
    #[must_use]
    pub fn new(engine: E, config: SupervisorConfig, main_queue: Arc<MainQueue>) -> Self {
        let limiter = RestartLimiter::from_config(&config.restart);
        Self {
            shared: Arc::new(Shared {
                engine,
                config,
                state: AtomicState::new(SupervisorState::Stopped),
                script_queue: Arc::new(CrossThreadQueue::new()),
                main_queue,
                control: Mutex::new(Control::default()),
                limiter: Mutex::new(limiter),
                counters: Counters::default(),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.shared.state.load()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SupervisorState::Running
    }

    /// The live instance, if any.
    #[must_use]
    pub fn current_handle(&self) -> Option<ScriptHandle> {
        self.shared.control.lock().current.clone()
    }

    /// The engine instances are created from.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.shared.engine
    }

    /// Queue drained by the primary dispatcher.
    #[must_use]
    pub fn main_queue(&self) -> &Arc<MainQueue> {
        &self.shared.main_queue
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        let c = &self.shared.counters;
        SupervisorStats {
            freeze_restarts: c.freeze_restarts.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            ticks: c.ticks.load(Ordering::Relaxed),
        }
    }

    /// Queues `task` for whichever instance is running.
    ///
    /// Returns `false` and drops the task if no instance is running.
    pub fn post(&self, task: E::Task) -> bool {
        if !self.is_running() {
            debug!(state = %self.state(), "Dropping script task: no running instance");
            return false;
        }
        self.shared.script_queue.enqueue(Tagged {
            generation: None,
            task,
        });
        true
    }

    /// Starts a new instance. No-op unless stopped.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spawn`] if the script thread cannot be created;
    /// the supervisor stays stopped.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut control = self.shared.control.lock();
        let state = self.state();
        if state != SupervisorState::Stopped {
            debug!(%state, "Start ignored");
            return Ok(());
        }

        // A thread that ended on its own has already retired; collect it.
        if let Some(previous) = control.thread.take() {
            if previous.join().is_err() {
                warn!("Previous script thread had panicked");
            }
        }
        // Leftovers were addressed to the previous instance.
        let stale = self.shared.script_queue.drain_all().len();
        if stale > 0 {
            debug!(stale, "Discarded queued script tasks");
        }

        let generation = control.last_generation + 1;
        let handle = ScriptHandle::new(generation);
        self.shared.state.store(SupervisorState::Running);

        let shared = Arc::clone(&self.shared);
        let thread_handle = handle.clone();
        let spawned = std::thread::Builder::new()
            .name(SCRIPT_THREAD_NAME.to_string())
            .spawn(move || shared.run_instance(&thread_handle));

        match spawned {
            Ok(thread) => {
                control.last_generation = generation;
                control.thread = Some(thread);
                control.current = Some(handle);
                info!(generation, "Script instance started");
                Ok(())
            }
            Err(e) => {
                self.shared.state.store(SupervisorState::Stopped);
                error!(error = %e, "Failed to spawn script thread");
                Err(RuntimeError::Spawn(e))
            }
        }
    }

    /// Stops the running instance and waits for its thread.
    ///
    /// Returns immediately if already stopping or stopped. Must not be called
    /// from the script thread.
    pub fn stop(&self) {
        if !self
            .shared
            .state
            .transition(SupervisorState::Running, SupervisorState::Stopping)
        {
            return;
        }
        info!("Stopping script");
        self.shared.script_queue.wake();

        let (thread, handle) = {
            let mut control = self.shared.control.lock();
            (control.thread.take(), control.current.clone())
        };
        match (thread, handle) {
            (Some(thread), Some(handle)) => {
                self.reap(thread, &handle, self.shared.config.stop_grace());
            }
            (Some(thread), None) => {
                // Retired on its own between the transition and the lock.
                if thread.join().is_err() {
                    warn!("Script thread panicked");
                }
            }
            (None, _) => {}
        }
    }

    /// Stops, clears the restart budget and starts again.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spawn`] if the new thread cannot be created.
    pub fn restart(&self) -> Result<(), RuntimeError> {
        self.stop();
        self.shared.limiter.lock().reset();
        self.start()
    }

    /// Detects a frozen instance and restarts it.
    ///
    /// Called periodically by the primary dispatcher. An instance counts as
    /// frozen when it is busy (heartbeat not parked) and its heartbeat is older
    /// than the configured threshold.
    pub fn check_liveness(&self) -> Liveness {
        if !self.is_running() {
            return Liveness::Idle;
        }
        let Some(handle) = self.current_handle() else {
            return Liveness::Idle;
        };
        let Some(stalled) = handle.heartbeat().stalled_for() else {
            return Liveness::Healthy;
        };
        if stalled <= self.shared.config.freeze_threshold() {
            return Liveness::Healthy;
        }
        if !self
            .shared
            .state
            .transition(SupervisorState::Running, SupervisorState::Stopping)
        {
            return Liveness::Idle;
        }

        let generation = handle.generation();
        warn!(
            generation,
            stalled_ms = u64::try_from(stalled.as_millis()).unwrap_or(u64::MAX),
            "Script frozen; cancelling"
        );
        let thread = self.shared.control.lock().thread.take();
        match thread {
            Some(thread) => self.reap(thread, &handle, Duration::ZERO),
            None => self.shared.retire(&handle),
        }

        if !self.shared.limiter.lock().try_acquire(Instant::now()) {
            error!(
                generation,
                max_restarts = self.shared.config.restart.max_restarts,
                window_secs = self.shared.config.restart.window_secs,
                "Freeze restart budget exhausted; script stays stopped"
            );
            return Liveness::RestartSuppressed;
        }

        match self.start() {
            Ok(()) => {
                self.shared
                    .counters
                    .freeze_restarts
                    .fetch_add(1, Ordering::Relaxed);
                let generation = self
                    .current_handle()
                    .map_or(generation + 1, |h| h.generation());
                Liveness::Restarted { generation }
            }
            Err(_) => Liveness::RestartFailed,
        }
    }

    /// Waits for `thread`, escalating to cancellation and then abandonment.
    fn reap(&self, thread: JoinHandle<()>, handle: &ScriptHandle, grace: Duration) {
        let generation = handle.generation();
        if !wait_finished(&thread, grace) {
            debug!(generation, "Cancelling script instance");
            handle.cancel_token().cancel();
            self.shared.script_queue.wake();

            if !wait_finished(&thread, self.shared.config.cancel_grace()) {
                error!(
                    generation,
                    cancel_grace_ms = self.shared.config.cancel_grace_ms,
                    "Script thread ignored cancellation; abandoning it"
                );
                self.shared.retire(handle);
                return;
            }
        }
        if thread.join().is_err() {
            warn!(generation, "Script thread panicked");
        }
        self.shared.retire(handle);
        debug!(generation, "Script thread exited");
    }
}

/// Polls `thread` until it finishes or `timeout` elapses.
fn wait_finished(thread: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if thread.is_finished() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep((deadline - now).min(REAP_POLL));
    }
}

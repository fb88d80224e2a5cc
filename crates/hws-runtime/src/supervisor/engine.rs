//! Script engine seam.
//!
//! The supervisor knows nothing about the embedded language. It asks a
//! [`ScriptEngine`] for a fresh [`ScriptInstance`] on the script thread, runs
//! queued tasks against it and calls its tick entry point. The instance is
//! created on, and never leaves, the script thread, so it need not be `Send`.

use super::handle::ScriptHandle;
use crate::cancel::CancelToken;
use crate::error::ScriptError;
use crate::queue::{CrossThreadQueue, MainQueue, MainTask};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What the script asked for after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextTick {
    /// No further ticks; the instance ends normally.
    Stop,
    /// Tick again after (at most) this delay.
    After(Duration),
}

impl NextTick {
    /// Interprets a delay in fractional seconds.
    ///
    /// Negative delays clamp to zero. NaN, infinite and unrepresentably large
    /// values are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::InvalidTick`] for non-finite input.
    pub fn after_secs(secs: f64) -> Result<Self, ScriptError> {
        if !secs.is_finite() {
            return Err(ScriptError::invalid_tick(format!("delay must be finite, got {secs}")));
        }
        Duration::try_from_secs_f64(secs.max(0.0))
            .map(Self::After)
            .map_err(|e| ScriptError::invalid_tick(format!("delay {secs}: {e}")))
    }
}

/// Task envelope on the script queue.
///
/// Tasks sent through a [`ScriptSender`] are bound to the generation that
/// created the sender and are dropped if a different instance drains them.
pub(crate) struct Tagged<T> {
    pub(crate) generation: Option<u64>,
    pub(crate) task: T,
}

pub(crate) type ScriptQueue<T> = CrossThreadQueue<Tagged<T>>;

/// Posts tasks back to one script instance from any thread.
pub struct ScriptSender<T> {
    queue: Arc<ScriptQueue<T>>,
    generation: u64,
}

impl<T> ScriptSender<T> {
    pub(crate) fn new(queue: Arc<ScriptQueue<T>>, generation: u64) -> Self {
        Self { queue, generation }
    }

    /// Queues `task` for the instance this sender belongs to.
    ///
    /// If that instance has been replaced by the time the task is drained,
    /// the task is discarded.
    pub fn send(&self, task: T) {
        self.queue.enqueue(Tagged {
            generation: Some(self.generation),
            task,
        });
    }

    /// Generation the sender is bound to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl<T> Clone for ScriptSender<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            generation: self.generation,
        }
    }
}

impl<T> fmt::Debug for ScriptSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptSender")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Everything an instance may use to reach the rest of the host.
pub struct ScriptEnv<T> {
    handle: ScriptHandle,
    main_queue: Arc<MainQueue>,
    sender: ScriptSender<T>,
}

impl<T> ScriptEnv<T> {
    pub(crate) fn new(handle: ScriptHandle, main_queue: Arc<MainQueue>, sender: ScriptSender<T>) -> Self {
        Self {
            handle,
            main_queue,
            sender,
        }
    }

    /// Identity of the instance being created.
    #[must_use]
    pub fn handle(&self) -> &ScriptHandle {
        &self.handle
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.handle.generation()
    }

    /// Token that is cancelled when the instance must unwind.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        self.handle.cancel_token()
    }

    /// Queue drained by the primary dispatcher.
    #[must_use]
    pub fn main_queue(&self) -> &Arc<MainQueue> {
        &self.main_queue
    }

    /// Schedules `task` on the primary thread.
    pub fn run_on_main(&self, task: impl FnOnce() + Send + 'static) {
        let task: MainTask = Box::new(task);
        self.main_queue.enqueue(task);
    }

    /// Sender bound to this instance's generation.
    #[must_use]
    pub fn script_sender(&self) -> ScriptSender<T> {
        self.sender.clone()
    }
}

/// Factory for script instances.
pub trait ScriptEngine: Send + Sync + 'static {
    /// Unit of work queued onto the script thread.
    type Task: Send + 'static;

    /// A live script. Lives on the script thread only.
    type Instance: ScriptInstance<Task = Self::Task>;

    /// Builds a fresh environment, runs the script's setup and returns the
    /// instance holding its tick entry point.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Setup`] if the script cannot be loaded or does
    /// not yield a tick entry point.
    fn instantiate(&self, env: &ScriptEnv<Self::Task>) -> Result<Self::Instance, ScriptError>;
}

/// A live script instance.
pub trait ScriptInstance {
    type Task;

    /// Runs one queued task inside the instance.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the instance.
    fn run_task(&mut self, task: Self::Task) -> Result<(), ScriptError>;

    /// Calls the tick entry point with the time since the instance started.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the instance.
    fn tick(&mut self, elapsed: Duration) -> Result<NextTick, ScriptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_secs_clamps_negative() {
        assert_eq!(NextTick::after_secs(-3.0).unwrap(), NextTick::After(Duration::ZERO));
        assert_eq!(
            NextTick::after_secs(0.25).unwrap(),
            NextTick::After(Duration::from_millis(250))
        );
    }

    #[test]
    fn after_secs_rejects_non_finite() {
        assert!(matches!(
            NextTick::after_secs(f64::NAN),
            Err(ScriptError::InvalidTick(_))
        ));
        assert!(NextTick::after_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn sender_tags_generation() {
        let queue: Arc<ScriptQueue<u32>> = Arc::new(CrossThreadQueue::new());
        let sender = ScriptSender::new(Arc::clone(&queue), 7);
        sender.clone().send(1);

        let drained: Vec<_> = queue.drain_all().into_iter().collect();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].generation, Some(7));
        assert_eq!(drained[0].task, 1);
    }
}

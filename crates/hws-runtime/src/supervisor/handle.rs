//! Identity of one script instance.

use crate::cancel::CancelToken;
use crate::heartbeat::HeartbeatClock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One running script instance.
///
/// A handle is created by `start()` and never mutated afterwards; a restart
/// replaces it with a new one carrying the next generation. Each instance has
/// its own heartbeat and cancel token, so a thread that was abandoned after a
/// freeze can neither refresh the liveness of its successor nor be revived by
/// it.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    generation: u64,
    started_at: Instant,
    cancel: CancelToken,
    heartbeat: Arc<HeartbeatClock>,
}

impl ScriptHandle {
    pub(crate) fn new(generation: u64) -> Self {
        let heartbeat = Arc::new(HeartbeatClock::new());
        heartbeat.beat();
        Self {
            generation,
            started_at: Instant::now(),
            cancel: CancelToken::new(),
            heartbeat,
        }
    }

    /// Monotonically increasing instance number, starting at 1.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// When this instance was started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since [`started_at`](Self::started_at).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// The instance's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The instance's liveness clock.
    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatClock {
        &self.heartbeat
    }

    /// Returns `true` if both handles denote the same instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        self.generation == other.generation
    }
}

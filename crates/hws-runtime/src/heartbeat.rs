//! Liveness timestamp shared between the script thread and the dispatcher.
//!
//! The script thread refreshes the clock when it starts a unit of work
//! (draining its queue, calling the tick entry point) and parks it before it
//! goes to sleep. The dispatcher only reads it. A parked clock never looks
//! stale, so long tick delays are not mistaken for a frozen script.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Marker value for "idle on the wait handle".
const PARKED: u64 = u64::MAX;

/// Single-word monotonic heartbeat.
#[derive(Debug)]
pub struct HeartbeatClock {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl HeartbeatClock {
    /// Creates a clock whose first beat is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        // Saturates far beyond any realistic uptime; PARKED stays unreachable.
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(PARKED - 1)
    }

    /// Records progress.
    pub fn beat(&self) {
        self.last_ms.store(self.now_ms(), Ordering::Release);
    }

    /// Marks the owner as idle until the next [`beat`](Self::beat).
    pub fn park(&self) {
        self.last_ms.store(PARKED, Ordering::Release);
    }

    /// Returns `true` while the owner is idle.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.last_ms.load(Ordering::Acquire) == PARKED
    }

    /// Time since the last beat, or `None` while parked.
    #[must_use]
    pub fn stalled_for(&self) -> Option<Duration> {
        let last = self.last_ms.load(Ordering::Acquire);
        if last == PARKED {
            return None;
        }
        Some(Duration::from_millis(self.now_ms().saturating_sub(last)))
    }
}

impl Default for HeartbeatClock {
    fn default() -> Self {
        Self::new()
    }
}

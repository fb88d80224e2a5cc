//! Freeze restart budget.
//!
//! Freeze recovery restarts immediately, but only `max_restarts` times within
//! a sliding window. Past the budget the supervisor stays stopped until an
//! explicit start, so a script that hangs on every run cannot spin the host.

use crate::config::RestartConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window restart counter.
#[derive(Debug, Clone)]
pub struct RestartLimiter {
    max_restarts: u32,
    window: Duration,
    history: VecDeque<Instant>,
}

impl RestartLimiter {
    /// Creates a limiter. `max_restarts == 0` means unlimited.
    #[must_use]
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            max_restarts,
            window,
            history: VecDeque::new(),
        }
    }

    /// Builds a limiter from configuration.
    #[must_use]
    pub fn from_config(config: &RestartConfig) -> Self {
        Self::new(config.max_restarts, Duration::from_secs(config.window_secs))
    }

    /// Records a restart at `now` if the budget allows one.
    ///
    /// Returns `false` (and records nothing) once the window is full.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.max_restarts == 0 {
            return true;
        }
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
        if self.history.len() >= self.max_restarts as usize {
            return false;
        }
        self.history.push_back(now);
        true
    }

    /// Forgets all recorded restarts.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Restarts currently counted against the window.
    #[must_use]
    pub fn recent(&self) -> usize {
        self.history.len()
    }
}

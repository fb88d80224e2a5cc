//! Supervisor lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the script thread.
///
/// ```text
/// Stopped ──start──► Running ──stop──► Stopping ──thread exits──► Stopped
///                       │
///                       └──tick returns stop / script error──► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// No script thread is alive (or the alive one has been abandoned).
    Stopped,
    /// The script thread is initializing or ticking.
    Running,
    /// A stop was requested; waiting for the thread to exit.
    Stopping,
}

impl SupervisorState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Stopping => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Lock-free cell holding a [`SupervisorState`].
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: SupervisorState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub(crate) fn load(&self) -> SupervisorState {
        SupervisorState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: SupervisorState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Moves `from → to` atomically. Returns `false` if the current state was not `from`.
    pub(crate) fn transition(&self, from: SupervisorState, to: SupervisorState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_only_from_expected_state() {
        let state = AtomicState::new(SupervisorState::Stopped);
        assert!(!state.transition(SupervisorState::Running, SupervisorState::Stopping));
        assert_eq!(state.load(), SupervisorState::Stopped);

        state.store(SupervisorState::Running);
        assert!(state.transition(SupervisorState::Running, SupervisorState::Stopping));
        assert_eq!(state.load(), SupervisorState::Stopping);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(SupervisorState::Stopping.to_string(), "stopping");
    }
}

//! Error taxonomy for the hwscript runtime.
//!
//! Every error type in the workspace implements [`ErrorCode`] so callers can
//! branch on a stable machine-readable code instead of matching display text.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | Script setup failed | `SCRIPT_SETUP_FAILED` | No |
//! | Script runtime error | `SCRIPT_RUNTIME_ERROR` | No |
//! | Invalid tick value | `SCRIPT_INVALID_TICK` | No |
//! | Script cancelled | `SCRIPT_CANCELLED` | Yes |
//! | Thread spawn failed | `RUNTIME_SPAWN_FAILED` | Yes |
//!
//! A recoverable script error is one the freeze detector restarts from.
//! Everything else leaves the supervisor stopped until an explicit start.

use thiserror::Error;

/// Machine-readable error code interface.
///
/// Codes are UPPER_SNAKE_CASE, prefixed with their domain, and stable.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns `true` if retrying (or restarting) may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Errors raised by a running script instance.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    /// The script could not be loaded or its setup did not return a tick entry point.
    #[error("script setup failed: {0}")]
    Setup(String),

    /// An uncaught error escaped a tick or a script-thread task.
    #[error("script runtime error: {0}")]
    Runtime(String),

    /// The tick entry point returned something other than a delay or a stop marker.
    #[error("invalid tick result: {0}")]
    InvalidTick(String),

    /// Execution was aborted through the instance's cancel token.
    #[error("script cancelled")]
    Cancelled,
}

impl ScriptError {
    /// Creates a setup error.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates an invalid tick error.
    pub fn invalid_tick(msg: impl Into<String>) -> Self {
        Self::InvalidTick(msg.into())
    }
}

impl ErrorCode for ScriptError {
    fn code(&self) -> &'static str {
        match self {
            Self::Setup(_) => "SCRIPT_SETUP_FAILED",
            Self::Runtime(_) => "SCRIPT_RUNTIME_ERROR",
            Self::InvalidTick(_) => "SCRIPT_INVALID_TICK",
            Self::Cancelled => "SCRIPT_CANCELLED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors raised by the supervision layer itself.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The script thread could not be spawned.
    #[error("failed to spawn script thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ErrorCode for RuntimeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Spawn(_) => "RUNTIME_SPAWN_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cancellation_is_recoverable() {
        assert!(ScriptError::Cancelled.is_recoverable());
        assert!(!ScriptError::setup("x").is_recoverable());
        assert!(!ScriptError::runtime("x").is_recoverable());
        assert!(!ScriptError::invalid_tick("x").is_recoverable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ScriptError::setup("bad").code(), "SCRIPT_SETUP_FAILED");
        assert_eq!(ScriptError::Cancelled.code(), "SCRIPT_CANCELLED");
        let err = RuntimeError::Spawn(std::io::Error::other("no threads"));
        assert_eq!(err.code(), "RUNTIME_SPAWN_FAILED");
        assert!(err.to_string().contains("no threads"));
    }
}

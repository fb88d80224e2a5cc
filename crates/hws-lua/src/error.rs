//! Error types for the Lua engine.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | Lua runtime error | `LUA_RUNTIME_ERROR` | No |
//! | Script file missing | `LUA_SCRIPT_NOT_FOUND` | Yes |
//! | Script unreadable | `LUA_SCRIPT_UNREADABLE` | Yes |
//! | Chunk did not return a function | `LUA_MISSING_TICK` | No |
//! | VM setup failed | `LUA_INIT_FAILED` | No |
//!
//! A missing or unreadable file is recoverable: fixing the file and
//! restarting is enough.

use hws_runtime::{ErrorCode, ScriptError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a Lua script instance.
#[derive(Debug, Error)]
pub enum LuaError {
    /// Lua runtime error.
    #[error("lua error: {0}")]
    Runtime(#[from] mlua::Error),

    /// Script file not found.
    #[error("script not found: {}", .0.display())]
    ScriptNotFound(PathBuf),

    /// Script file exists but could not be read.
    #[error("failed to read script '{}': {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The top-level chunk returned something other than a function.
    #[error("script must return a tick function, got {0}")]
    MissingTick(String),

    /// The VM could not be prepared.
    #[error("init failed: {0}")]
    InitFailed(String),
}

impl ErrorCode for LuaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "LUA_RUNTIME_ERROR",
            Self::ScriptNotFound(_) => "LUA_SCRIPT_NOT_FOUND",
            Self::Unreadable { .. } => "LUA_SCRIPT_UNREADABLE",
            Self::MissingTick(_) => "LUA_MISSING_TICK",
            Self::InitFailed(_) => "LUA_INIT_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::ScriptNotFound(_) | Self::Unreadable { .. })
    }
}

impl From<LuaError> for ScriptError {
    fn from(err: LuaError) -> Self {
        ScriptError::Setup(err.to_string())
    }
}

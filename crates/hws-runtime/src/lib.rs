//! hwscript runtime: supervision core.
//!
//! Keeps a long-running user script alive on its own thread while the
//! primary thread performs operations with main-thread affinity (hardware
//! writes) on the script's behalf.
//!
//! # Architecture
//!
//! ```text
//!  bus / timers / signals                      primary thread
//!          │                              ┌────────────────────┐
//!          │      ┌── MainQueue ─────────►│ Dispatcher::run    │
//!          │      │                       │  drain tasks       │
//!          ▼      │                       │  check_liveness ───┼──┐
//!  ┌──────────────┴───┐                   │  wait(poll)        │  │
//!  │ script thread    │◄── script queue ──┴────────────────────┘  │
//!  │  instantiate     │                                           │
//!  │  drain / tick    │◄──────── cancel / restart ────────────────┘
//!  │  park / wait     │
//!  └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`queue`]: [`CrossThreadQueue`](queue::CrossThreadQueue), the only
//!   channel between the two threads
//! - [`heartbeat`] / [`cancel`]: per-instance liveness clock and
//!   cancellation token
//! - [`supervisor`]: script lifecycle, freeze detection, restart budget
//! - [`dispatcher`]: the primary loop
//! - [`collab`]: interfaces to hardware, devices, power profiles and state
//! - [`config`]: layered TOML configuration
//! - [`testing`]: in-memory collaborators and a closure-driven engine

pub mod cancel;
pub mod collab;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod heartbeat;
pub mod queue;
pub mod supervisor;
pub mod testing;

pub use cancel::CancelToken;
pub use dispatcher::{Dispatcher, DispatcherHandle, ScriptControl};
pub use error::{ErrorCode, RuntimeError, ScriptError};
pub use queue::{CrossThreadQueue, MainQueue, MainTask};
pub use supervisor::{
    Liveness, NextTick, ScriptEngine, ScriptEnv, ScriptHandle, ScriptInstance, ScriptSender,
    Supervisor, SupervisorState, SupervisorStats,
};

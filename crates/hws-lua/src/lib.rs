//! Lua script engine for hwscript.
//!
//! [`LuaEngine`] plugs into the runtime's
//! [`Supervisor`](hws_runtime::Supervisor): every (re)start builds a fresh
//! Lua 5.4 VM, exposes the `hw` binding table and evaluates the user script,
//! whose top-level chunk returns the tick function.
//!
//! ```lua
//! local fan = hw.control("Motherboard / Fans / Fan 2")
//! local cpu = hw.sensor("CPU / Temperatures / Package")
//!
//! hw.bus_on_event = function(sender, message)
//!   hw.bus_send(sender, "ack " .. message)
//! end
//!
//! return function(elapsed)
//!   local t = cpu:value() or 0
//!   fan:set(t > 70 and 100 or 40)
//!   return 1.0 -- tick again in one second; nil or "stop" ends the script
//! end
//! ```
//!
//! Host-side wiring:
//!
//! ```no_run
//! use hws_lua::{route_bus_events, HostServices, LuaEngine};
//! use hws_runtime::config::SupervisorConfig;
//! use hws_runtime::queue::MainQueue;
//! use hws_runtime::Supervisor;
//! use std::sync::Arc;
//!
//! let host = HostServices::detached();
//! let bus = Arc::clone(&host.bus);
//! let engine = LuaEngine::new("/etc/hwscript/script.lua", host);
//! let supervisor = Supervisor::new(engine, SupervisorConfig::default(), Arc::new(MainQueue::new()));
//! route_bus_events(&bus, supervisor.clone());
//! supervisor.start().unwrap();
//! ```

mod bindings;
mod engine;
mod error;
mod host;

pub use bindings::{route_bus_events, HW_GLOBAL, SCRIPT_TARGET};
pub use engine::{interpret_tick, LuaEngine, LuaInstance, LuaTask};
pub use error::LuaError;
pub use host::HostServices;

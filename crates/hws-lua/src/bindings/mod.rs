//! The `hw` global.
//!
//! | Binding | Runs on |
//! |---------|---------|
//! | `hw.file` | value |
//! | `hw.sensor(path)` / `hw.control(path)` | script thread (lookup) |
//! | `control:set(v)` / `control:reset()` | primary thread |
//! | `hw.readfile(path)` / `hw.mtime(path)` | script thread |
//! | `hw.get_state()` / `hw.set_state(text)` | script thread |
//! | `hw.bus_send(id, data)` / `hw.bus_broadcast(data)` | transport pool |
//! | `hw.bus_on_event` | script thread (assigned by the script) |
//! | `hw.connect_devices(host, port, cb)` | primary thread, `cb` on script thread |
//! | `client:*` mutations | primary thread |
//! | `hw.power_profile(name)` / `profile:activate()` | lookup here, activation on primary |
//! | `hw.log([level,] msg)` | script thread |
//!
//! Fallible lookups follow the Lua convention of returning `value` or
//! `nil, message` instead of raising.

mod bus;
mod callbacks;
mod devices;
mod directory;
mod files;
mod log;
mod power;
mod state;

pub use bus::route_bus_events;
pub use log::SCRIPT_TARGET;

use crate::engine::LuaTask;
use crate::host::HostServices;
use hws_runtime::queue::MainQueue;
use hws_runtime::ScriptSender;
use mlua::{IntoLua, Lua, Table, Value};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

/// Name of the global binding table.
pub const HW_GLOBAL: &str = "hw";

/// What every binding closure captures.
#[derive(Clone)]
pub(crate) struct BindingContext {
    pub(crate) host: HostServices,
    pub(crate) main: Arc<MainQueue>,
    pub(crate) sender: ScriptSender<LuaTask>,
    pub(crate) generation: u64,
}

impl BindingContext {
    /// Schedules `task` on the primary thread.
    pub(crate) fn run_on_main(&self, task: impl FnOnce() + Send + 'static) {
        self.main.enqueue(Box::new(task));
    }
}

/// Builds the `hw` table and installs it as a global.
pub(crate) fn register(lua: &Lua, ctx: &BindingContext, script: &Path) -> mlua::Result<Table> {
    let hw = lua.create_table()?;
    hw.set("file", script.to_string_lossy().into_owned())?;

    directory::register(lua, &hw, ctx)?;
    files::register(lua, &hw)?;
    state::register(lua, &hw, ctx)?;
    bus::register(lua, &hw, ctx)?;
    devices::register(lua, &hw, ctx)?;
    power::register(lua, &hw, ctx)?;
    log::register(lua, &hw, ctx)?;

    lua.globals().set(HW_GLOBAL, hw.clone())?;
    Ok(hw)
}

/// `value, nil` on success, `nil, message` on failure.
fn lua_result<T: IntoLua>(
    lua: &Lua,
    result: Result<T, impl Display>,
) -> mlua::Result<(Value, Option<String>)> {
    match result {
        Ok(value) => Ok((value.into_lua(lua)?, None)),
        Err(e) => Ok((Value::Nil, Some(e.to_string()))),
    }
}

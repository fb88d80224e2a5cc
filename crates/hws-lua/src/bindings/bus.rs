//! Event bus bindings.
//!
//! Outbound: `hw.bus_send(id, data)` and `hw.bus_broadcast(data)` only queue
//! frames for the transport; they never block and never fail.
//!
//! Inbound: [`route_bus_events`] turns each `(sender, message)` from the bus
//! into a script task that calls `hw.bus_on_event(sender, message)` if the
//! script assigned one.

use super::{BindingContext, HW_GLOBAL};
use crate::engine::{LuaEngine, LuaTask};
use hws_bus::{EventBus, SessionId};
use hws_runtime::Supervisor;
use mlua::{Lua, Table, Value};
use tracing::trace;

/// Field the script assigns its subscriber to.
const ON_EVENT: &str = "bus_on_event";

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let bus = ctx.host.bus.clone();
    let send = lua.create_function(move |_, (id, data): (String, String)| {
        bus.send(&SessionId::from(id), &data);
        Ok(())
    })?;
    hw.set("bus_send", send)?;

    let bus = ctx.host.bus.clone();
    let broadcast = lua.create_function(move |_, data: String| Ok(bus.broadcast(&data)))?;
    hw.set("bus_broadcast", broadcast)?;

    Ok(())
}

/// Script task delivering one inbound message.
pub(crate) fn event_task(sender: String, message: String) -> LuaTask {
    Box::new(move |lua: &Lua| {
        let hw: Table = lua.globals().get(HW_GLOBAL)?;
        match hw.get::<Value>(ON_EVENT)? {
            Value::Function(handler) => handler.call::<()>((sender, message)),
            _ => {
                trace!(%sender, "Bus message dropped: no hw.bus_on_event");
                Ok(())
            }
        }
    })
}

/// Installs the bus handler that forwards inbound messages to the script.
///
/// Messages arriving while no instance is running are dropped. The handler
/// keeps `supervisor` alive; call [`EventBus::clear_handler`] on shutdown.
pub fn route_bus_events(bus: &EventBus, supervisor: Supervisor<LuaEngine>) {
    bus.set_handler(move |sender: &SessionId, message: &str| {
        supervisor.post(event_task(sender.to_string(), message.to_string()));
    });
}

//! `hw.get_state()` and `hw.set_state(text)`.

use super::BindingContext;
use mlua::{Lua, Table};
use tracing::warn;

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let store = ctx.host.state.clone();
    let get_state = lua.create_function(move |_, ()| {
        Ok(match store.load() {
            Ok(text) => (text, None),
            Err(e) => {
                warn!(error = %e, "State read failed");
                (None, Some(e.to_string()))
            }
        })
    })?;
    hw.set("get_state", get_state)?;

    let store = ctx.host.state.clone();
    let set_state = lua.create_function(move |_, text: String| {
        Ok(match store.save(&text) {
            Ok(()) => (Some(true), None),
            Err(e) => {
                warn!(error = %e, "State write failed");
                (None, Some(e.to_string()))
            }
        })
    })?;
    hw.set("set_state", set_state)?;

    Ok(())
}

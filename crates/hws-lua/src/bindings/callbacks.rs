//! Script callbacks waiting for a primary-thread result.
//!
//! A Lua function cannot leave the script thread. The binding parks it in a
//! registry table under a numeric id and sends only the id across; the
//! result comes back as a script task that takes the function out again.

use mlua::{Function, Lua, Table, Value};
use std::cell::Cell;

const REGISTRY_KEY: &str = "hwscript.pending_callbacks";

pub(super) struct Callbacks {
    next: Cell<i64>,
}

impl Callbacks {
    /// Creates the registry table for this VM.
    pub(super) fn install(lua: &Lua) -> mlua::Result<Self> {
        lua.set_named_registry_value(REGISTRY_KEY, lua.create_table()?)?;
        Ok(Self { next: Cell::new(1) })
    }

    /// Parks `callback` and returns its id.
    pub(super) fn hold(&self, lua: &Lua, callback: Function) -> mlua::Result<i64> {
        let id = self.next.get();
        self.next.set(id + 1);
        pending(lua)?.raw_set(id, callback)?;
        Ok(id)
    }

    /// Removes and returns the callback parked under `id`.
    pub(super) fn take(lua: &Lua, id: i64) -> mlua::Result<Option<Function>> {
        let table = pending(lua)?;
        let callback: Option<Function> = table.raw_get(id)?;
        table.raw_set(id, Value::Nil)?;
        Ok(callback)
    }

    #[cfg(test)]
    pub(super) fn len(lua: &Lua) -> mlua::Result<usize> {
        Ok(pending(lua)?.pairs::<i64, Function>().count())
    }
}

fn pending(lua: &Lua) -> mlua::Result<Table> {
    lua.named_registry_value(REGISTRY_KEY)
}

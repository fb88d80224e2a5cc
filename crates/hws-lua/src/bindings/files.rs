//! `hw.readfile(path)` and `hw.mtime(path)`.

use super::lua_result;
use mlua::{Lua, Table};
use std::path::Path;
use std::time::UNIX_EPOCH;

pub(super) fn register(lua: &Lua, hw: &Table) -> mlua::Result<()> {
    let readfile = lua.create_function(|lua, path: String| {
        let result = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"));
        lua_result(lua, result)
    })?;
    hw.set("readfile", readfile)?;

    let mtime = lua.create_function(|_, path: String| Ok(mtime(Path::new(&path))))?;
    hw.set("mtime", mtime)?;

    Ok(())
}

/// Last modification time in whole unix seconds, `None` if unavailable.
fn mtime(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    i64::try_from(secs).ok()
}

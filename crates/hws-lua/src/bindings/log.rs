//! `hw.log([level,] message)` and `print`.

use super::BindingContext;
use mlua::{Lua, Table, Value, Variadic};
use tracing::{debug, error, info, trace, warn};

/// Tracing target of script-emitted records.
pub const SCRIPT_TARGET: &str = "hwscript::script";

fn emit(generation: u64, level: &str, message: &str) {
    match level.to_ascii_lowercase().as_str() {
        "trace" => trace!(target: SCRIPT_TARGET, generation, "{message}"),
        "debug" => debug!(target: SCRIPT_TARGET, generation, "{message}"),
        "warn" | "warning" => warn!(target: SCRIPT_TARGET, generation, "{message}"),
        "error" => error!(target: SCRIPT_TARGET, generation, "{message}"),
        _ => info!(target: SCRIPT_TARGET, generation, "{message}"),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy().to_string(),
        other => other.type_name().to_string(),
    }
}

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let generation = ctx.generation;
    let log = lua.create_function(move |_, (first, second): (String, Option<String>)| {
        match second {
            Some(message) => emit(generation, &first, &message),
            None => emit(generation, "info", &first),
        }
        Ok(())
    })?;
    hw.set("log", log)?;

    let print = lua.create_function(move |_, values: Variadic<Value>| {
        let line: Vec<String> = values.iter().map(display).collect();
        emit(generation, "info", &line.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_scalars() {
        assert_eq!(display(&Value::Nil), "nil");
        assert_eq!(display(&Value::Boolean(true)), "true");
        assert_eq!(display(&Value::Integer(42)), "42");
        assert_eq!(display(&Value::Number(0.5)), "0.5");
    }
}

//! `hw.sensor(path)` and `hw.control(path)`.
//!
//! Reads go straight to the element. Writes are clamped here, on the script
//! thread, and performed on the primary thread.

use super::{lua_result, BindingContext};
use hws_runtime::collab::{Control, Element};
use mlua::{Lua, Table, UserData, UserDataMethods};
use std::sync::Arc;
use tracing::{debug, warn};

struct SensorHandle {
    path: String,
    element: Element,
}

impl UserData for SensorHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("value", |_, this, ()| Ok(this.element.read()));
        methods.add_method("path", |_, this, ()| Ok(this.path.clone()));
    }
}

struct ControlHandle {
    path: String,
    control: Arc<dyn Control>,
    ctx: BindingContext,
}

impl ControlHandle {
    fn schedule_set(&self, value: f64) {
        let clamped = self.control.clamp(value);
        let control = Arc::clone(&self.control);
        let path = self.path.clone();
        self.ctx.run_on_main(move || match control.set(clamped) {
            Ok(()) => debug!(%path, value = clamped, "Control set"),
            Err(e) => warn!(%path, value = clamped, error = %e, "Control write failed"),
        });
    }

    fn schedule_reset(&self) {
        let control = Arc::clone(&self.control);
        let path = self.path.clone();
        self.ctx.run_on_main(move || match control.reset() {
            Ok(()) => debug!(%path, "Control reset to automatic"),
            Err(e) => warn!(%path, error = %e, "Control reset failed"),
        });
    }
}

impl UserData for ControlHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("value", |_, this, ()| Ok(this.control.value()));
        methods.add_method("min", |_, this, ()| Ok(this.control.min()));
        methods.add_method("max", |_, this, ()| Ok(this.control.max()));
        methods.add_method("path", |_, this, ()| Ok(this.path.clone()));

        // nil hands the control back to automatic mode.
        methods.add_method("set", |_, this, value: Option<f64>| {
            match value {
                Some(v) if !v.is_finite() => {
                    return Err(mlua::Error::RuntimeError(format!(
                        "control value must be finite, got {v}"
                    )));
                }
                Some(v) => this.schedule_set(v),
                None => this.schedule_reset(),
            }
            Ok(())
        });

        methods.add_method("reset", |_, this, ()| {
            this.schedule_reset();
            Ok(())
        });
    }
}

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let c = ctx.clone();
    let sensor = lua.create_function(move |lua, path: String| {
        let result = c
            .host
            .directory
            .snapshot()
            .sensor(&path)
            .map(|element| SensorHandle { path, element });
        lua_result(lua, result)
    })?;
    hw.set("sensor", sensor)?;

    let c = ctx.clone();
    let control = lua.create_function(move |lua, path: String| {
        let result = c
            .host
            .directory
            .snapshot()
            .control(&path)
            .map(|control| ControlHandle {
                path,
                control,
                ctx: c.clone(),
            });
        lua_result(lua, result)
    })?;
    hw.set("control", control)?;

    Ok(())
}

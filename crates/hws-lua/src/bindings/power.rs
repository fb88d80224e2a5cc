//! `hw.power_profile(name)`.

use super::{lua_result, BindingContext};
use hws_runtime::collab::{PowerProfile, PowerProfiles};
use mlua::{Lua, Table, UserData, UserDataMethods};
use std::sync::Arc;
use tracing::{info, warn};

struct PowerProfileHandle {
    profile: PowerProfile,
    profiles: Arc<dyn PowerProfiles>,
    ctx: BindingContext,
}

impl UserData for PowerProfileHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("name", |_, this, ()| Ok(this.profile.name.clone()));

        methods.add_method("activate", |_, this, ()| {
            let profile = this.profile.clone();
            let profiles = Arc::clone(&this.profiles);
            this.ctx.run_on_main(move || match profiles.activate(&profile) {
                Ok(()) => info!(profile = %profile.name, "Power profile activated"),
                Err(e) => warn!(profile = %profile.name, error = %e, "Power profile activation failed"),
            });
            Ok(())
        });
    }
}

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let c = ctx.clone();
    let power_profile = lua.create_function(move |lua, name: String| {
        let result = c.host.power.find(&name).map(|profile| PowerProfileHandle {
            profile,
            profiles: Arc::clone(&c.host.power),
            ctx: c.clone(),
        });
        lua_result(lua, result)
    })?;
    hw.set("power_profile", power_profile)?;
    Ok(())
}

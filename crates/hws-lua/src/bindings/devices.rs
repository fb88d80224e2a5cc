//! Lighting device client bindings.
//!
//! ```lua
//! hw.connect_devices("127.0.0.1", 6742, function(err, client, data)
//!   if err then return hw.log("warn", err) end
//!   local strip = data.devices["LED Strip"]
//!   client:set_custom_mode(strip.id)
//!   client:set_colors(strip.id, { { r = 255, g = 0, b = 0 } })
//! end)
//! ```
//!
//! Connecting and every mutation run on the primary thread. Mutations on a
//! disconnected client are skipped; I/O failures are logged and swallowed so
//! a flaky controller never takes the script down.

use super::callbacks::Callbacks;
use super::BindingContext;
use hws_runtime::collab::{
    CollabError, Color, DeviceClient, DeviceInfo, Direction, Endpoint, ModeRequest,
};
use hws_runtime::queue::MainQueue;
use mlua::{Function, Lua, Table, UserData, UserDataMethods, Value};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

type Connection = Result<(Arc<dyn DeviceClient>, Vec<DeviceInfo>), String>;

struct DeviceClientHandle {
    client: Arc<dyn DeviceClient>,
    main: Arc<MainQueue>,
}

impl DeviceClientHandle {
    fn with_connection<F>(&self, op: &'static str, call: F)
    where
        F: FnOnce(&dyn DeviceClient) -> Result<(), CollabError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        self.main.enqueue(Box::new(move || {
            if !client.is_connected() {
                trace!(op, "Device client disconnected; call skipped");
                return;
            }
            if let Err(e) = call(client.as_ref()) {
                if e.is_transient() {
                    debug!(op, error = %e, "Device call failed");
                } else {
                    warn!(op, error = %e, "Device call failed");
                }
            }
        }));
    }
}

impl UserData for DeviceClientHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("set_custom_mode", |_, this, device: u32| {
            this.with_connection("set_custom_mode", move |c| c.set_custom_mode(device));
            Ok(())
        });

        methods.add_method("set_colors", |_, this, (device, colors): (u32, Table)| {
            let colors = parse_colors(&colors)?;
            this.with_connection("set_colors", move |c| c.set_colors(device, &colors));
            Ok(())
        });

        methods.add_method(
            "set_mode",
            |_,
             this,
             (device, mode_id, speed, direction, colors): (
                u32,
                u32,
                Option<u32>,
                Option<String>,
                Option<Table>,
            )| {
                let direction = direction
                    .map(|d| d.parse::<Direction>())
                    .transpose()
                    .map_err(mlua::Error::external)?;
                let colors = colors.as_ref().map(parse_colors).transpose()?;
                let request = ModeRequest {
                    mode_id,
                    speed,
                    direction,
                    colors,
                };
                this.with_connection("set_mode", move |c| c.set_mode(device, &request));
                Ok(())
            },
        );

        methods.add_method("connected", |_, this, ()| Ok(this.client.is_connected()));

        methods.add_method("disconnect", |_, this, ()| {
            let client = Arc::clone(&this.client);
            this.main.enqueue(Box::new(move || client.disconnect()));
            Ok(())
        });
    }
}

/// Reads a sequence of `{ r =, g =, b = }` tables.
fn parse_colors(table: &Table) -> mlua::Result<Vec<Color>> {
    table
        .sequence_values::<Table>()
        .map(|entry| {
            let entry = entry?;
            Ok(Color::new(
                channel(entry.get("r")?),
                channel(entry.get("g")?),
                channel(entry.get("b")?),
            ))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn channel(value: f64) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// `{ devices = { [name] = { id, type, vendor, ..., modes = { [name] = {...} } } } }`
fn devices_table(lua: &Lua, devices: &[DeviceInfo]) -> mlua::Result<Table> {
    let by_name = lua.create_table()?;
    for device in devices {
        let entry = lua.create_table()?;
        entry.set("id", device.id)?;
        entry.set("type", device.kind.as_str())?;
        entry.set("vendor", device.vendor.as_str())?;
        entry.set("description", device.description.as_str())?;
        entry.set("version", device.version.as_str())?;
        entry.set("serial", device.serial.as_str())?;
        entry.set("location", device.location.as_str())?;
        entry.set("led_count", device.led_count)?;

        let modes = lua.create_table()?;
        for mode in &device.modes {
            let flags = lua.create_table()?;
            flags.set("has_speed", mode.flags.has_speed)?;
            flags.set("has_direction_lr", mode.flags.has_direction_lr)?;
            flags.set("has_direction_ud", mode.flags.has_direction_ud)?;
            flags.set("has_direction_hv", mode.flags.has_direction_hv)?;
            flags.set("has_brightness", mode.flags.has_brightness)?;
            flags.set("has_per_led_color", mode.flags.has_per_led_color)?;
            flags.set("has_mode_specific_color", mode.flags.has_mode_specific_color)?;
            flags.set("has_random_color", mode.flags.has_random_color)?;
            flags.set("has_direction", mode.flags.has_direction())?;

            let m = lua.create_table()?;
            m.set("id", mode.id)?;
            m.set("flags", flags)?;
            m.set("speed_min", mode.speed_min)?;
            m.set("speed_max", mode.speed_max)?;
            modes.set(mode.name.as_str(), m)?;
        }
        entry.set("modes", modes)?;
        by_name.set(device.name.as_str(), entry)?;
    }

    let data = lua.create_table()?;
    data.set("devices", by_name)?;
    Ok(data)
}

/// Hands the connection outcome to the parked callback.
fn deliver(lua: &Lua, id: i64, outcome: Connection, main: Arc<MainQueue>) -> mlua::Result<()> {
    let Some(callback) = Callbacks::take(lua, id)? else {
        return Ok(());
    };
    match outcome {
        Ok((client, devices)) => {
            let data = devices_table(lua, &devices)?;
            let handle = DeviceClientHandle { client, main };
            callback.call::<()>((Value::Nil, handle, data))
        }
        Err(message) => callback.call::<()>(message),
    }
}

pub(super) fn register(lua: &Lua, hw: &Table, ctx: &BindingContext) -> mlua::Result<()> {
    let callbacks = Callbacks::install(lua)?;
    let c = ctx.clone();
    let connect = lua.create_function(
        move |lua, (host, port, callback): (String, u16, Function)| {
            let id = callbacks.hold(lua, callback)?;
            let endpoint = Endpoint::new(host, port);
            let connector = Arc::clone(&c.host.devices);
            let sender = c.sender.clone();
            let main = Arc::clone(&c.main);

            c.run_on_main(move || {
                let outcome = connector.connect(&endpoint).and_then(|client| {
                    let devices = client.devices()?;
                    Ok((client, devices))
                });
                let outcome: Connection = match outcome {
                    Ok((client, devices)) => {
                        info!(%endpoint, devices = devices.len(), "Device client connected");
                        Ok((client, devices))
                    }
                    Err(e) => {
                        warn!(%endpoint, error = %e, "Device client connection failed");
                        Err(e.to_string())
                    }
                };
                sender.send(Box::new(move |lua: &Lua| deliver(lua, id, outcome, main)));
            });
            Ok(())
        },
    )?;
    hw.set("connect_devices", connect)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_parse_and_clamp() {
        let lua = Lua::new();
        let table: Table = lua
            .load("return { { r = 255, g = 0, b = 16 }, { r = 300, g = -5, b = 1.9 } }")
            .eval()
            .unwrap();

        let colors = parse_colors(&table).unwrap();
        assert_eq!(colors, vec![Color::new(255, 0, 16), Color::new(255, 0, 1)]);
    }

    #[test]
    fn color_without_channel_is_an_error() {
        let lua = Lua::new();
        let table: Table = lua.load("return { { r = 1, g = 2 } }").eval().unwrap();
        assert!(parse_colors(&table).is_err());
    }
}

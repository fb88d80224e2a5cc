//! `hw.*` bindings, driven synchronously through a script harness.
//!
//! Each test writes an inline script, instantiates it, ticks once and pumps
//! the primary/script queues by hand, so the order of cross-thread work is
//! deterministic.

use hws_bus::EventBus;
use hws_lua::{HostServices, LuaEngine, LuaInstance, LuaTask};
use hws_runtime::collab::{
    Color, DeviceInfo, DeviceMode, Direction, DirectorySnapshot, MemoryStateStore, ModeFlags,
    ModeRequest, SharedDirectory, StateStore,
};
use hws_runtime::testing::{
    DeviceCall, MemoryControl, MemorySensor, RecordingDeviceClient, ScriptHarness,
    StaticConnector, StaticPowerProfiles,
};
use hws_runtime::{NextTick, ScriptEngine, ScriptInstance};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Fixture {
    dir: TempDir,
    harness: ScriptHarness<LuaTask>,
    instance: LuaInstance,
}

impl Fixture {
    fn new(source: &str, host: HostServices) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.lua");
        std::fs::write(&path, source).unwrap();
        let harness = ScriptHarness::new(1);
        let instance = LuaEngine::new(path, host)
            .instantiate(&harness.env())
            .unwrap();
        Self {
            dir,
            harness,
            instance,
        }
    }

    fn tick(&mut self) -> NextTick {
        self.instance.tick(Duration::ZERO).unwrap()
    }

    fn pump(&mut self) -> usize {
        self.harness.pump(&mut self.instance).unwrap()
    }

    fn global<T: mlua::FromLua>(&self, name: &str) -> T {
        self.instance.lua().globals().get(name).unwrap()
    }
}

fn directory(fan: &Arc<MemoryControl>, temp: &Arc<MemorySensor>) -> Arc<SharedDirectory> {
    let snapshot = DirectorySnapshot::builder()
        .sensor("CPU / Temperatures / Package", temp.clone())
        .control("Board / Fans / Fan 1", fan.clone())
        .build();
    Arc::new(SharedDirectory::new(snapshot))
}

// =============================================================================
// Sensors and controls
// =============================================================================

mod directory_bindings {
    use super::*;

    #[test]
    fn sensor_reads_live_value() {
        let fan = Arc::new(MemoryControl::new(0.0, 100.0));
        let temp = Arc::new(MemorySensor::new(41.5));
        let host = HostServices::detached().with_directory(directory(&fan, &temp));
        let mut f = Fixture::new(
            r#"
local cpu = hw.sensor("CPU / Temperatures / Package")
return function()
  reading = cpu:value()
  return 1
end
"#,
            host,
        );

        f.tick();
        assert_eq!(f.global::<f64>("reading"), 41.5);

        temp.update(Some(55.0));
        f.tick();
        assert_eq!(f.global::<f64>("reading"), 55.0);
    }

    #[test]
    fn unknown_path_returns_nil_and_message() {
        let mut f = Fixture::new(
            r#"
local s, err = hw.sensor("nowhere")
missing = (s == nil)
message = err
return function() return nil end
"#,
            HostServices::detached(),
        );

        assert_eq!(f.tick(), NextTick::Stop);
        assert!(f.global::<bool>("missing"));
        assert!(f.global::<String>("message").contains("nowhere"));
    }

    #[test]
    fn sensor_is_not_a_control() {
        let fan = Arc::new(MemoryControl::new(0.0, 100.0));
        let temp = Arc::new(MemorySensor::new(30.0));
        let host = HostServices::detached().with_directory(directory(&fan, &temp));
        let f = Fixture::new(
            r#"
local c, err = hw.control("CPU / Temperatures / Package")
message = err
return function() end
"#,
            host,
        );

        assert!(f.global::<String>("message").contains("not a control"));
    }

    #[test]
    fn control_writes_wait_for_the_primary_queue_and_are_clamped() {
        let fan = Arc::new(MemoryControl::new(20.0, 100.0));
        let temp = Arc::new(MemorySensor::unset());
        let host = HostServices::detached().with_directory(directory(&fan, &temp));
        let mut f = Fixture::new(
            r#"
local fan = hw.control("Board / Fans / Fan 1")
lo, hi = fan:min(), fan:max()
return function()
  fan:set(150)
  fan:set(5)
  fan:set(nil)
  fan:reset()
  return 1
end
"#,
            host,
        );

        f.tick();
        assert!(fan.writes().is_empty());

        f.pump();
        assert_eq!(fan.writes(), vec![Some(100.0), Some(20.0), None, None]);
        assert_eq!(f.global::<f64>("lo"), 20.0);
        assert_eq!(f.global::<f64>("hi"), 100.0);
    }

    #[test]
    fn control_value_is_nil_in_automatic_mode() {
        let fan = Arc::new(MemoryControl::new(0.0, 100.0));
        let temp = Arc::new(MemorySensor::unset());
        let host = HostServices::detached().with_directory(directory(&fan, &temp));
        let mut f = Fixture::new(
            r#"
local fan = hw.control("Board / Fans / Fan 1")
return function()
  auto = (fan:value() == nil)
  fan:set(60)
  return 1
end
"#,
            host,
        );

        f.tick();
        f.pump();
        assert!(f.global::<bool>("auto"));
        f.tick();
        assert!(!f.global::<bool>("auto"));
    }

    #[test]
    fn non_finite_control_value_raises() {
        let fan = Arc::new(MemoryControl::new(0.0, 100.0));
        let temp = Arc::new(MemorySensor::unset());
        let host = HostServices::detached().with_directory(directory(&fan, &temp));
        let mut f = Fixture::new(
            r#"
local fan = hw.control("Board / Fans / Fan 1")
return function() fan:set(0/0) end
"#,
            host,
        );

        assert!(f.instance.tick(Duration::ZERO).is_err());
        f.pump();
        assert!(fan.writes().is_empty());
    }
}

// =============================================================================
// Files and state
// =============================================================================

mod file_bindings {
    use super::*;

    #[test]
    fn readfile_and_mtime() {
        let mut f = Fixture::new(
            r#"
return function()
  text = hw.readfile((hw.file:gsub("script%.lua$", "data.txt")))
  stamp = hw.mtime(hw.file)
  gone = hw.mtime(hw.file .. ".missing")
  local _, err = hw.readfile(hw.file .. ".missing")
  read_err = err
end
"#,
            HostServices::detached(),
        );
        std::fs::write(f.dir.path().join("data.txt"), "payload").unwrap();

        assert_eq!(f.tick(), NextTick::Stop);
        assert_eq!(f.global::<String>("text"), "payload");
        assert!(f.global::<i64>("stamp") > 0);
        assert_eq!(f.global::<Option<i64>>("gone"), None);
        assert!(f.global::<String>("read_err").contains(".missing"));
    }

    #[test]
    fn hw_file_is_the_script_path() {
        let f = Fixture::new("path = hw.file\nreturn function() end", HostServices::detached());
        let expected = f.dir.path().join("script.lua");
        assert_eq!(f.global::<String>("path"), expected.to_string_lossy());
    }

    #[test]
    fn state_roundtrip_through_the_store() {
        let store = Arc::new(MemoryStateStore::new());
        let host = HostServices::detached().with_state(store.clone());
        let mut f = Fixture::new(
            r#"
return function()
  before = hw.get_state()
  saved = hw.set_state('{"mode":"quiet"}')
  after = hw.get_state()
end
"#,
            host,
        );

        f.tick();
        assert_eq!(f.global::<Option<String>>("before"), None);
        assert!(f.global::<bool>("saved"));
        assert_eq!(f.global::<String>("after"), r#"{"mode":"quiet"}"#);
        assert_eq!(store.load().unwrap().as_deref(), Some(r#"{"mode":"quiet"}"#));
    }
}

// =============================================================================
// Event bus
// =============================================================================

mod bus_bindings {
    use super::*;
    use hws_bus::SessionId;

    #[test]
    fn send_and_broadcast_reach_sessions() {
        let bus = Arc::new(EventBus::new());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        bus.register(SessionId::from("a"), tx_a);
        bus.register(SessionId::from("b"), tx_b);

        let host = HostServices::detached().with_bus(Arc::clone(&bus));
        let mut f = Fixture::new(
            r#"
return function()
  hw.bus_send("a", "just a")
  hw.bus_send("gone", "nobody")
  reached = hw.bus_broadcast("all")
end
"#,
            host,
        );

        f.tick();
        assert_eq!(f.global::<i64>("reached"), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "just a");
        assert_eq!(rx_a.try_recv().unwrap(), "all");
        assert_eq!(rx_b.try_recv().unwrap(), "all");
        assert!(rx_b.try_recv().is_err());
    }
}

// =============================================================================
// Devices
// =============================================================================

mod device_bindings {
    use super::*;

    fn strip() -> DeviceInfo {
        DeviceInfo {
            id: 0,
            name: "LED Strip".into(),
            kind: "ledstrip".into(),
            vendor: "Acme".into(),
            description: "ARGB strip".into(),
            version: "1.0".into(),
            serial: "S1".into(),
            location: "usb:1".into(),
            modes: vec![DeviceMode {
                id: 3,
                name: "Breathing".into(),
                flags: ModeFlags {
                    has_speed: true,
                    has_direction_lr: true,
                    ..ModeFlags::default()
                },
                speed_min: 1,
                speed_max: 10,
            }],
            led_count: 30,
        }
    }

    const CONNECT: &str = r#"
hw.connect_devices("127.0.0.1", 6742, function(err, client, data)
  connect_err = err
  if err then return end
  local strip = data.devices["LED Strip"]
  leds = strip.led_count
  mode_flags_dir = strip.modes["Breathing"].flags.has_direction
  client:set_custom_mode(strip.id)
  client:set_colors(strip.id, { { r = 255, g = 0, b = 0 }, { r = 0, g = 0, b = 255 } })
  client:set_mode(strip.id, strip.modes["Breathing"].id, 5, "left")
  still_connected = client:connected()
end)
return function() return 1 end
"#;

    #[test]
    fn connect_delivers_client_and_routes_mutations_to_primary() {
        let client = Arc::new(RecordingDeviceClient::new(vec![strip()]));
        let connector = Arc::new(StaticConnector::new(Arc::clone(&client)));
        let host = HostServices::detached().with_devices(connector.clone());
        let mut f = Fixture::new(CONNECT, host);

        // Connect runs on the primary queue, the callback on the script queue,
        // and the callback's mutations on the primary queue again.
        assert_eq!(connector.connects(), 0);
        f.pump();

        assert_eq!(connector.connects(), 1);
        assert_eq!(f.global::<Option<String>>("connect_err"), None);
        assert_eq!(f.global::<i64>("leds"), 30);
        assert!(f.global::<bool>("mode_flags_dir"));
        assert!(f.global::<bool>("still_connected"));
        assert_eq!(
            client.calls(),
            vec![
                DeviceCall::SetCustomMode(0),
                DeviceCall::SetColors(0, vec![Color::new(255, 0, 0), Color::new(0, 0, 255)]),
                DeviceCall::SetMode(
                    0,
                    ModeRequest {
                        mode_id: 3,
                        speed: Some(5),
                        direction: Some(Direction::Left),
                        colors: None,
                    }
                ),
            ]
        );
    }

    #[test]
    fn connection_failure_is_passed_to_the_callback() {
        let mut f = Fixture::new(CONNECT, HostServices::detached());
        f.pump();

        assert!(f.global::<String>("connect_err").contains("127.0.0.1:6742"));
        assert_eq!(f.global::<Option<i64>>("leds"), None);
    }

    #[test]
    fn io_failures_are_swallowed() {
        let client = Arc::new(RecordingDeviceClient::new(vec![strip()]));
        client.fail_writes(true);
        let host = HostServices::detached()
            .with_devices(Arc::new(StaticConnector::new(Arc::clone(&client))));
        let mut f = Fixture::new(CONNECT, host);

        f.pump();
        assert!(client.calls().is_empty());
        assert_eq!(f.tick(), NextTick::After(Duration::from_secs(1)));
    }

    #[test]
    fn disconnect_skips_later_mutations() {
        let client = Arc::new(RecordingDeviceClient::new(vec![strip()]));
        let host = HostServices::detached()
            .with_devices(Arc::new(StaticConnector::new(Arc::clone(&client))));
        let mut f = Fixture::new(
            r#"
hw.connect_devices("localhost", 6742, function(err, client)
  client:disconnect()
  client:set_custom_mode(0)
end)
return function() end
"#,
            host,
        );

        f.pump();
        assert_eq!(client.calls(), vec![DeviceCall::Disconnect]);
    }

    #[test]
    fn bad_direction_raises_in_the_callback() {
        let client = Arc::new(RecordingDeviceClient::new(vec![strip()]));
        let host = HostServices::detached()
            .with_devices(Arc::new(StaticConnector::new(Arc::clone(&client))));
        let mut f = Fixture::new(
            r#"
hw.connect_devices("localhost", 6742, function(err, client)
  client:set_mode(0, 3, nil, "sideways")
end)
return function() end
"#,
            host,
        );

        let err = f.harness.pump(&mut f.instance).unwrap_err();
        assert!(err.to_string().contains("cannot be converted to direction"));
    }
}

// =============================================================================
// Power profiles and logging
// =============================================================================

mod misc_bindings {
    use super::*;

    #[test]
    fn power_profile_activates_on_primary() {
        let profiles = Arc::new(StaticPowerProfiles::new(&["Balanced", "Quiet"]));
        let host = HostServices::detached().with_power(profiles.clone());
        let mut f = Fixture::new(
            r#"
local quiet = hw.power_profile("Quiet")
local none, err = hw.power_profile("Turbo")
missing_err = err
name = quiet:name()
return function() quiet:activate() end
"#,
            host,
        );

        f.tick();
        assert!(profiles.activated().is_empty());
        f.pump();
        assert_eq!(profiles.activated(), vec!["Quiet".to_string()]);
        assert_eq!(f.global::<String>("name"), "Quiet");
        assert!(f.global::<String>("missing_err").contains("Turbo"));
    }

    #[test]
    fn log_and_print_accept_any_arity() {
        let mut f = Fixture::new(
            r#"
return function()
  hw.log("plain message")
  hw.log("warn", "with level")
  print("a", 1, nil, true)
  return "stop"
end
"#,
            HostServices::detached(),
        );

        assert_eq!(f.tick(), NextTick::Stop);
    }
}

//! Lua scripts under a real supervisor and primary dispatcher.

use hws_bus::{EventBus, SessionId};
use hws_lua::{route_bus_events, HostServices, LuaEngine};
use hws_runtime::collab::{DirectorySnapshot, MemoryStateStore, SharedDirectory};
use hws_runtime::config::{DispatcherConfig, SupervisorConfig};
use hws_runtime::queue::MainQueue;
use hws_runtime::testing::MemoryControl;
use hws_runtime::{Dispatcher, DispatcherHandle, Supervisor, SupervisorState};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

const PRIMARY: &str = "primary";
const TIMEOUT: Duration = Duration::from_secs(10);

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn write_script(dir: &TempDir, source: &str) -> PathBuf {
    let path = dir.path().join("script.lua");
    std::fs::write(&path, source).unwrap();
    path
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        freeze_threshold_ms: 200,
        stop_grace_ms: 200,
        cancel_grace_ms: 2000,
        ..SupervisorConfig::default()
    }
}

struct Host {
    supervisor: Supervisor<LuaEngine>,
    handle: DispatcherHandle,
    primary: Option<JoinHandle<()>>,
}

impl Host {
    fn start(engine: LuaEngine, config: SupervisorConfig) -> Self {
        let bus = Arc::clone(&engine.host().bus);
        let supervisor = Supervisor::new(engine, config, Arc::new(MainQueue::new()));
        route_bus_events(&bus, supervisor.clone());
        let dispatcher = Dispatcher::new(
            supervisor.clone(),
            &DispatcherConfig {
                poll_interval_ms: 20,
            },
        );
        let handle = dispatcher.handle();
        supervisor.start().unwrap();
        let primary = thread::Builder::new()
            .name(PRIMARY.to_string())
            .spawn(move || dispatcher.run())
            .unwrap();
        Self {
            supervisor,
            handle,
            primary: Some(primary),
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.supervisor.engine().host().bus.clear_handler();
        self.handle.stop();
        if let Some(primary) = self.primary.take() {
            let _ = primary.join();
        }
    }
}

#[test]
fn control_writes_happen_on_the_primary_thread() {
    let fan = Arc::new(MemoryControl::new(0.0, 100.0));
    let directory = SharedDirectory::new(
        DirectorySnapshot::builder()
            .control("Board / Fans / Fan 1", fan.clone())
            .build(),
    );
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"
local fan = hw.control("Board / Fans / Fan 1")
local done = false
return function()
  if not done then
    fan:set(35)
    done = true
  end
  return 0.02
end
"#,
    );
    let host = HostServices::detached().with_directory(Arc::new(directory));
    let _host = Host::start(LuaEngine::new(script, host), SupervisorConfig::default());

    assert!(wait_until(TIMEOUT, || !fan.writes().is_empty()));
    assert_eq!(fan.writes(), vec![Some(35.0)]);
    assert_eq!(fan.writer_threads(), vec![Some(PRIMARY.to_string())]);
}

#[test]
fn bus_messages_reach_the_script_subscriber() {
    let bus = Arc::new(EventBus::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let peer = SessionId::from("peer-1");
    bus.register(peer.clone(), tx);

    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"
hw.bus_on_event = function(sender, message)
  hw.bus_send(sender, "pong:" .. message)
end
return function() return 5 end
"#,
    );
    let host = HostServices::detached().with_bus(Arc::clone(&bus));
    let host = Host::start(LuaEngine::new(script, host), SupervisorConfig::default());
    assert!(wait_until(TIMEOUT, || host.supervisor.stats().ticks > 0));

    // Delivered while the script sleeps in a 5 second tick delay.
    bus.deliver(&peer, "ping");

    let mut reply = None;
    assert!(wait_until(TIMEOUT, || {
        reply = rx.try_recv().ok();
        reply.is_some()
    }));
    assert_eq!(reply.as_deref(), Some("pong:ping"));
}

#[test]
fn runaway_lua_loop_is_cancelled_and_restarted() {
    let bus = Arc::new(EventBus::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.register(SessionId::from("observer"), tx);

    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"
hw.bus_broadcast("started")
local calls = 0
return function()
  calls = calls + 1
  if calls == 2 and hw.get_state() == nil then
    hw.set_state("froze once")
    while true do end
  end
  return 0.05
end
"#,
    );
    let host = HostServices::detached()
        .with_bus(Arc::clone(&bus))
        .with_state(Arc::new(MemoryStateStore::new()));
    let host = Host::start(LuaEngine::new(script, host), fast_config());

    let mut started = 0;
    assert!(wait_until(TIMEOUT, || {
        while rx.try_recv().is_ok() {
            started += 1;
        }
        started == 2
    }));
    assert!(wait_until(TIMEOUT, || host.supervisor.stats().ticks >= 4));

    let stats = host.supervisor.stats();
    assert_eq!(stats.freeze_restarts, 1);
    assert_eq!(
        host.supervisor.current_handle().map(|h| h.generation()),
        Some(2)
    );
}

#[test]
fn script_error_stops_without_restart() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "return function() error('boom') end");
    let host = Host::start(
        LuaEngine::new(script, HostServices::detached()),
        fast_config(),
    );

    assert!(wait_until(TIMEOUT, || {
        host.supervisor.state() == SupervisorState::Stopped
    }));
    thread::sleep(Duration::from_millis(300));

    assert_eq!(host.supervisor.state(), SupervisorState::Stopped);
    assert_eq!(host.supervisor.stats().failures, 1);
    assert_eq!(host.supervisor.stats().freeze_restarts, 0);
    assert!(host.handle.is_running());
}

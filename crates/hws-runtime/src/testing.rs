//! In-memory collaborators and a closure-driven script engine.
//!
//! Used by this crate's tests, by the Lua binding tests, and by `hwscript
//! check`, which runs a script once against empty stand-ins.
//!
//! # Engine Example
//!
//! ```
//! use hws_runtime::supervisor::NextTick;
//! use hws_runtime::testing::{tick_fn, FnEngine};
//! use std::time::Duration;
//!
//! // Ticks every 10ms, stops after the third tick.
//! let engine = FnEngine::new(|_env| {
//!     let mut calls = 0;
//!     Ok(tick_fn(move |_elapsed| {
//!         calls += 1;
//!         Ok(if calls == 3 { NextTick::Stop } else { NextTick::After(Duration::from_millis(10)) })
//!     }))
//! });
//! # let _ = engine;
//! ```

use crate::collab::{
    CollabError, Color, Control, DeviceClient, DeviceConnector, DeviceInfo, Endpoint,
    ModeRequest, PowerProfile, PowerProfiles, Sensor,
};
use crate::error::ScriptError;
use crate::queue::MainQueue;
use crate::supervisor::{
    NextTick, ScriptEngine, ScriptEnv, ScriptHandle, ScriptInstance, ScriptQueue, ScriptSender,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// === Directory elements ===

/// Sensor holding a settable reading.
#[derive(Debug, Default)]
pub struct MemorySensor {
    value: Mutex<Option<f64>>,
}

impl MemorySensor {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }

    /// Sensor that has no reading yet.
    #[must_use]
    pub fn unset() -> Self {
        Self::default()
    }

    /// Updates the reading, as a hardware poll would.
    pub fn update(&self, value: Option<f64>) {
        *self.value.lock() = value;
    }
}

impl Sensor for MemorySensor {
    fn value(&self) -> Option<f64> {
        *self.value.lock()
    }
}

/// Control that stores writes and records the thread that made them.
#[derive(Debug)]
pub struct MemoryControl {
    min: f64,
    max: f64,
    value: Mutex<Option<f64>>,
    writes: Mutex<Vec<Option<f64>>>,
    writer_threads: Mutex<Vec<Option<String>>>,
}

impl MemoryControl {
    /// Creates a control in automatic mode (no software value).
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            value: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            writer_threads: Mutex::new(Vec::new()),
        }
    }

    /// Every write in order: `Some(v)` for `set`, `None` for `reset`.
    #[must_use]
    pub fn writes(&self) -> Vec<Option<f64>> {
        self.writes.lock().clone()
    }

    /// Names of the threads that performed each write.
    #[must_use]
    pub fn writer_threads(&self) -> Vec<Option<String>> {
        self.writer_threads.lock().clone()
    }

    fn record(&self, value: Option<f64>) {
        *self.value.lock() = value;
        self.writes.lock().push(value);
        self.writer_threads
            .lock()
            .push(std::thread::current().name().map(str::to_string));
    }
}

impl Control for MemoryControl {
    fn value(&self) -> Option<f64> {
        *self.value.lock()
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn set(&self, value: f64) -> Result<(), CollabError> {
        self.record(Some(value));
        Ok(())
    }

    fn reset(&self) -> Result<(), CollabError> {
        self.record(None);
        Ok(())
    }
}

// === Devices ===

/// Call recorded by [`RecordingDeviceClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetCustomMode(u32),
    SetColors(u32, Vec<Color>),
    SetMode(u32, ModeRequest),
    Disconnect,
}

/// Device client that records mutations instead of talking to hardware.
#[derive(Debug)]
pub struct RecordingDeviceClient {
    devices: Vec<DeviceInfo>,
    calls: Mutex<Vec<DeviceCall>>,
    connected: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingDeviceClient {
    #[must_use]
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            devices,
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every later mutation fail with a connection reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().clone()
    }

    fn mutate(&self, call: DeviceCall) -> Result<(), CollabError> {
        if !self.is_connected() {
            return Err(CollabError::unavailable("device client"));
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(CollabError::Io(std::io::ErrorKind::ConnectionReset.into()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl DeviceClient for RecordingDeviceClient {
    fn devices(&self) -> Result<Vec<DeviceInfo>, CollabError> {
        Ok(self.devices.clone())
    }

    fn set_custom_mode(&self, device: u32) -> Result<(), CollabError> {
        self.mutate(DeviceCall::SetCustomMode(device))
    }

    fn set_colors(&self, device: u32, colors: &[Color]) -> Result<(), CollabError> {
        self.mutate(DeviceCall::SetColors(device, colors.to_vec()))
    }

    fn set_mode(&self, device: u32, request: &ModeRequest) -> Result<(), CollabError> {
        self.mutate(DeviceCall::SetMode(device, request.clone()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.calls.lock().push(DeviceCall::Disconnect);
        }
    }
}

/// Connector that always hands out the same client.
#[derive(Debug, Clone)]
pub struct StaticConnector {
    client: Arc<RecordingDeviceClient>,
    connects: Arc<AtomicUsize>,
}

impl StaticConnector {
    #[must_use]
    pub fn new(client: Arc<RecordingDeviceClient>) -> Self {
        Self {
            client,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `connect` calls so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}

impl DeviceConnector for StaticConnector {
    fn connect(&self, _endpoint: &Endpoint) -> Result<Arc<dyn DeviceClient>, CollabError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(self.client.clone())
    }
}

// === Power profiles ===

/// Fixed profile list that records activations.
#[derive(Debug, Default)]
pub struct StaticPowerProfiles {
    profiles: Vec<PowerProfile>,
    activated: Mutex<Vec<String>>,
}

impl StaticPowerProfiles {
    /// Creates profiles whose ids equal their names.
    #[must_use]
    pub fn new(names: &[&str]) -> Self {
        Self {
            profiles: names
                .iter()
                .map(|name| PowerProfile {
                    id: (*name).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
            activated: Mutex::new(Vec::new()),
        }
    }

    /// Names activated so far, in order.
    #[must_use]
    pub fn activated(&self) -> Vec<String> {
        self.activated.lock().clone()
    }
}

impl PowerProfiles for StaticPowerProfiles {
    fn list(&self) -> Result<Vec<PowerProfile>, CollabError> {
        Ok(self.profiles.clone())
    }

    fn activate(&self, profile: &PowerProfile) -> Result<(), CollabError> {
        self.activated.lock().push(profile.name.clone());
        Ok(())
    }
}

// === Script engine ===

/// Task type of [`FnEngine`].
pub type FnTask = Box<dyn FnOnce() -> Result<(), ScriptError> + Send>;

/// Tick entry point returned by an [`FnEngine`] setup closure.
pub type TickFn = Box<dyn FnMut(Duration) -> Result<NextTick, ScriptError>>;

type SetupFn = dyn Fn(&ScriptEnv<FnTask>) -> Result<TickFn, ScriptError> + Send + Sync;

/// Boxes a tick closure.
pub fn tick_fn(
    tick: impl FnMut(Duration) -> Result<NextTick, ScriptError> + 'static,
) -> TickFn {
    Box::new(tick)
}

/// Script engine whose "script" is a Rust closure.
///
/// The setup closure runs on the script thread for every new instance and
/// returns that instance's tick function.
pub struct FnEngine {
    setup: Box<SetupFn>,
}

impl FnEngine {
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn(&ScriptEnv<FnTask>) -> Result<TickFn, ScriptError> + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(setup),
        }
    }
}

/// Instance created by [`FnEngine`].
pub struct FnInstance {
    tick: TickFn,
}

impl ScriptEngine for FnEngine {
    type Task = FnTask;
    type Instance = FnInstance;

    fn instantiate(&self, env: &ScriptEnv<FnTask>) -> Result<FnInstance, ScriptError> {
        Ok(FnInstance {
            tick: (self.setup)(env)?,
        })
    }
}

impl ScriptInstance for FnInstance {
    type Task = FnTask;

    fn run_task(&mut self, task: FnTask) -> Result<(), ScriptError> {
        task()
    }

    fn tick(&mut self, elapsed: Duration) -> Result<NextTick, ScriptError> {
        (self.tick)(elapsed)
    }
}

// === Synchronous harness ===

/// Runs a script instance on the calling thread, without a supervisor.
///
/// The harness owns both queues. Callers build an instance from
/// [`env`](Self::env), tick it themselves and [`pump`](Self::pump) the
/// queues in between, so primary-thread work and script callbacks run in a
/// deterministic order.
pub struct ScriptHarness<T> {
    handle: ScriptHandle,
    main: Arc<MainQueue>,
    script: Arc<ScriptQueue<T>>,
}

impl<T> ScriptHarness<T> {
    /// Creates a harness for an instance of the given generation.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            handle: ScriptHandle::new(generation),
            main: Arc::new(MainQueue::new()),
            script: Arc::new(ScriptQueue::new()),
        }
    }

    /// Environment to instantiate a script against.
    #[must_use]
    pub fn env(&self) -> ScriptEnv<T> {
        let sender = ScriptSender::new(Arc::clone(&self.script), self.handle.generation());
        ScriptEnv::new(self.handle.clone(), Arc::clone(&self.main), sender)
    }

    #[must_use]
    pub fn handle(&self) -> &ScriptHandle {
        &self.handle
    }

    #[must_use]
    pub fn main_queue(&self) -> &Arc<MainQueue> {
        &self.main
    }

    /// Runs every queued primary-thread task. Returns how many ran.
    pub fn run_main(&self) -> usize {
        let tasks = self.main.drain_all();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Removes queued script tasks addressed to this generation.
    pub fn take_script_tasks(&self) -> Vec<T> {
        let generation = self.handle.generation();
        self.script
            .drain_all()
            .into_iter()
            .filter(|t| t.generation.map_or(true, |g| g == generation))
            .map(|t| t.task)
            .collect()
    }

    /// Alternates between both queues until neither has work.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a script task.
    pub fn pump<I>(&self, instance: &mut I) -> Result<usize, ScriptError>
    where
        I: ScriptInstance<Task = T>,
    {
        let mut ran = 0;
        loop {
            let main = self.run_main();
            let tasks = self.take_script_tasks();
            if main == 0 && tasks.is_empty() {
                return Ok(ran);
            }
            ran += main + tasks.len();
            for task in tasks {
                instance.run_task(task)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_control_records_writes() {
        let control = MemoryControl::new(0.0, 100.0);
        assert_eq!(control.value(), None);
        control.set(30.0).unwrap();
        control.reset().unwrap();
        assert_eq!(control.writes(), vec![Some(30.0), None]);
        assert_eq!(control.value(), None);
    }

    #[test]
    fn disconnected_client_rejects_mutations() {
        let client = RecordingDeviceClient::new(Vec::new());
        client.set_custom_mode(0).unwrap();
        client.disconnect();
        client.disconnect();

        assert!(matches!(
            client.set_colors(0, &[Color::new(1, 2, 3)]),
            Err(CollabError::Unavailable(_))
        ));
        assert_eq!(
            client.calls(),
            vec![DeviceCall::SetCustomMode(0), DeviceCall::Disconnect]
        );
    }

    #[test]
    fn harness_pumps_main_then_script_tasks() {
        let harness: ScriptHarness<FnTask> = ScriptHarness::new(3);
        let env = harness.env();
        let engine = FnEngine::new(|_env| Ok(tick_fn(|_| Ok(NextTick::Stop))));
        let mut instance = engine.instantiate(&env).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let sender = env.script_sender();
        let log = Arc::clone(&order);
        env.run_on_main(move || {
            log.lock().push("main");
            let log = Arc::clone(&log);
            sender.send(Box::new(move || {
                log.lock().push("script");
                Ok(())
            }));
        });

        assert_eq!(harness.pump(&mut instance).unwrap(), 2);
        assert_eq!(*order.lock(), vec!["main", "script"]);
        assert_eq!(env.generation(), 3);
    }

    #[test]
    fn static_profiles_find_by_name() {
        let profiles = StaticPowerProfiles::new(&["Balanced", "Quiet"]);
        let quiet = profiles.find("Quiet").unwrap();
        profiles.activate(&quiet).unwrap();
        assert_eq!(profiles.activated(), vec!["Quiet".to_string()]);
    }
}

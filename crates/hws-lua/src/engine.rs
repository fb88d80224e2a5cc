//! Lua implementation of the script engine.
//!
//! Each instance gets a brand-new VM: module paths, the `hw` table and the
//! cancellation hook are installed, then the script file is evaluated. Its
//! top-level chunk must return the tick function.
//!
//! # Cancellation
//!
//! An instruction-count hook checks the instance's [`CancelToken`] every
//! `hook_instruction_interval` VM instructions and raises an error once it
//! is cancelled, so a runaway loop unwinds mid-tick. Time spent inside a
//! native call is not interruptible this way; the supervisor's abandon path
//! covers that case.

use crate::bindings::{self, BindingContext};
use crate::error::LuaError;
use crate::host::HostServices;
use hws_runtime::config::{HwsConfig, SupervisorConfig};
use hws_runtime::{CancelToken, NextTick, ScriptEngine, ScriptEnv, ScriptError, ScriptInstance};
use mlua::{Function, HookTriggers, Lua, Table, Value, VmState};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Unit of work run on the script thread against the instance's VM.
pub type LuaTask = Box<dyn FnOnce(&Lua) -> mlua::Result<()> + Send>;

/// Tick result that ends the instance, besides `nil`.
const STOP_MARKER: &str = "stop";

/// Error text raised by the cancellation hook.
const CANCELLED: &str = "script cancelled";

/// Creates Lua script instances from a script file.
#[derive(Debug, Clone)]
pub struct LuaEngine {
    script: PathBuf,
    search_paths: Vec<PathBuf>,
    hook_interval: u32,
    host: HostServices,
}

impl LuaEngine {
    #[must_use]
    pub fn new(script: impl Into<PathBuf>, host: HostServices) -> Self {
        Self {
            script: script.into(),
            search_paths: Vec::new(),
            hook_interval: SupervisorConfig::default().hook_instruction_interval,
            host,
        }
    }

    /// Engine for the configured script, search paths and hook interval.
    #[must_use]
    pub fn from_config(config: &HwsConfig, host: HostServices) -> Self {
        Self::new(config.script.resolved_path(), host)
            .with_search_paths(config.script.search_paths.iter().cloned())
            .with_hook_interval(config.supervisor.hook_instruction_interval)
    }

    /// Adds a `require()` root, searched after the script's own directory.
    #[must_use]
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    /// VM instructions between cancellation checks. `0` disables the hook.
    #[must_use]
    pub fn with_hook_interval(mut self, interval: u32) -> Self {
        self.hook_interval = interval;
        self
    }

    #[must_use]
    pub fn script(&self) -> &Path {
        &self.script
    }

    #[must_use]
    pub fn host(&self) -> &HostServices {
        &self.host
    }

    /// Module roots in search order: the script's directory, then the extras.
    #[must_use]
    pub fn module_roots(&self) -> Vec<PathBuf> {
        let script_dir = self
            .script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        script_dir
            .into_iter()
            .chain(self.search_paths.iter().cloned())
            .collect()
    }

    fn read_source(&self) -> Result<String, LuaError> {
        std::fs::read_to_string(&self.script).map_err(|source| match source.kind() {
            ErrorKind::NotFound => LuaError::ScriptNotFound(self.script.clone()),
            _ => LuaError::Unreadable {
                path: self.script.clone(),
                source,
            },
        })
    }

    /// Prepends the module roots to `package.path`.
    fn install_module_paths(&self, lua: &Lua) -> Result<(), LuaError> {
        let package: Table = lua
            .globals()
            .get("package")
            .map_err(|e| LuaError::InitFailed(format!("package table missing: {e}")))?;
        let current: String = package.get("path").unwrap_or_default();

        let mut path = String::new();
        for root in self.module_roots() {
            let root = root.display();
            path.push_str(&format!("{root}/?.lua;{root}/?/init.lua;"));
        }
        path.push_str(&current);

        package
            .set("path", path)
            .map_err(|e| LuaError::InitFailed(format!("set package.path: {e}")))
    }

    fn build(&self, env: &ScriptEnv<LuaTask>) -> Result<(Lua, Function), LuaError> {
        let source = self.read_source()?;
        let lua = Lua::new();
        self.install_module_paths(&lua)?;

        let ctx = BindingContext {
            host: self.host.clone(),
            main: Arc::clone(env.main_queue()),
            sender: env.script_sender(),
            generation: env.generation(),
        };
        bindings::register(&lua, &ctx, &self.script)
            .map_err(|e| LuaError::InitFailed(format!("register hw bindings: {e}")))?;

        install_cancel_hook(&lua, env.cancel_token().clone(), self.hook_interval);

        let chunk_name = format!("@{}", self.script.display());
        let value: Value = lua.load(source.as_str()).set_name(chunk_name).eval()?;
        match value {
            Value::Function(tick) => Ok((lua, tick)),
            other => Err(LuaError::MissingTick(other.type_name().to_string())),
        }
    }
}

fn install_cancel_hook(lua: &Lua, token: CancelToken, interval: u32) {
    if interval == 0 {
        return;
    }
    lua.set_hook(
        HookTriggers::new().every_nth_instruction(interval),
        move |_lua, _debug| {
            if token.is_cancelled() {
                Err(mlua::Error::RuntimeError(CANCELLED.to_string()))
            } else {
                Ok(VmState::Continue)
            }
        },
    );
}

impl ScriptEngine for LuaEngine {
    type Task = LuaTask;
    type Instance = LuaInstance;

    fn instantiate(&self, env: &ScriptEnv<LuaTask>) -> Result<LuaInstance, ScriptError> {
        let token = env.cancel_token().clone();
        match self.build(env) {
            Ok((lua, tick)) => {
                debug!(
                    generation = env.generation(),
                    script = %self.script.display(),
                    "Lua instance ready"
                );
                Ok(LuaInstance { lua, tick, token })
            }
            Err(_) if token.is_cancelled() => Err(ScriptError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

/// One live Lua VM and its tick function.
pub struct LuaInstance {
    lua: Lua,
    tick: Function,
    token: CancelToken,
}

impl LuaInstance {
    /// The instance's VM.
    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    fn fail(&self, err: &mlua::Error) -> ScriptError {
        if self.token.is_cancelled() {
            ScriptError::Cancelled
        } else {
            ScriptError::runtime(err.to_string())
        }
    }
}

impl ScriptInstance for LuaInstance {
    type Task = LuaTask;

    fn run_task(&mut self, task: LuaTask) -> Result<(), ScriptError> {
        task(&self.lua).map_err(|e| self.fail(&e))
    }

    fn tick(&mut self, elapsed: Duration) -> Result<NextTick, ScriptError> {
        let value: Value = self
            .tick
            .call(elapsed.as_secs_f64())
            .map_err(|e| self.fail(&e))?;
        interpret_tick(&value)
    }
}

/// Maps a tick function's return value onto the next-delay contract.
///
/// # Errors
///
/// Returns [`ScriptError::InvalidTick`] for anything but `nil`, `"stop"` or
/// a finite number.
#[allow(clippy::cast_precision_loss)]
pub fn interpret_tick(value: &Value) -> Result<NextTick, ScriptError> {
    match value {
        Value::Nil => Ok(NextTick::Stop),
        Value::String(s) if s.to_string_lossy() == STOP_MARKER => Ok(NextTick::Stop),
        Value::Integer(secs) => NextTick::after_secs(*secs as f64),
        Value::Number(secs) => NextTick::after_secs(*secs),
        other => Err(ScriptError::invalid_tick(format!(
            "expected nil, \"stop\" or a delay in seconds, got {}",
            other.type_name()
        ))),
    }
}

//! `hwscript check`: one dry run of a script without hardware.
//!
//! The script is instantiated against detached collaborators (empty
//! directory, no device client, no power profiles, in-memory state, a bus
//! with no peers), ticked once and its queues are pumped to quiescence on
//! the calling thread. A watchdog cancels the run once the freeze threshold
//! passes, so a runaway script fails instead of hanging the command.

use hws_lua::{HostServices, LuaEngine, LuaTask};
use hws_runtime::config::HwsConfig;
use hws_runtime::testing::ScriptHarness;
use hws_runtime::{CancelToken, NextTick, ScriptEngine, ScriptError, ScriptInstance};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a successful check.
#[derive(Debug)]
pub struct CheckReport {
    pub script: PathBuf,
    pub next: NextTick,
    /// Primary-thread and script-thread tasks that ran.
    pub tasks: usize,
    pub elapsed: Duration,
}

impl CheckReport {
    /// One-line summary for the terminal.
    pub fn summary(&self) -> String {
        let next = match self.next {
            NextTick::Stop => "script asked to stop".to_string(),
            NextTick::After(delay) => format!("next tick in {:.3}s", delay.as_secs_f64()),
        };
        format!(
            "{}: ok ({next}, {} task(s), {} ms)",
            self.script.display(),
            self.tasks,
            self.elapsed.as_millis()
        )
    }
}

/// Loads the configured script, runs setup and a single tick.
///
/// # Errors
///
/// Returns the [`ScriptError`] raised by setup, the tick or a queued task.
/// A run that outlives the freeze threshold ends as [`ScriptError::Cancelled`].
pub fn check_script(config: &HwsConfig) -> Result<CheckReport, ScriptError> {
    let engine = LuaEngine::from_config(config, HostServices::detached());
    let harness = ScriptHarness::<LuaTask>::new(1);
    let started = Instant::now();

    let finished = CancelToken::new();
    let watchdog = {
        let finished = finished.clone();
        let token = harness.handle().cancel_token().clone();
        let limit = config.supervisor.freeze_threshold();
        thread::spawn(move || {
            if !finished.wait(limit) {
                debug!(limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX), "Check timed out");
                token.cancel();
            }
        })
    };

    let result = run_once(&engine, &harness);
    finished.cancel();
    let _ = watchdog.join();

    let (next, tasks) = result?;
    Ok(CheckReport {
        script: engine.script().to_path_buf(),
        next,
        tasks,
        elapsed: started.elapsed(),
    })
}

fn run_once(
    engine: &LuaEngine,
    harness: &ScriptHarness<LuaTask>,
) -> Result<(NextTick, usize), ScriptError> {
    let mut instance = engine.instantiate(&harness.env())?;
    let mut tasks = harness.pump(&mut instance)?;
    let next = instance.tick(harness.handle().elapsed())?;
    tasks += harness.pump(&mut instance)?;
    Ok((next, tasks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(source: &str) -> (TempDir, HwsConfig) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("script.lua");
        fs::write(&path, source).expect("write script");
        let mut config = HwsConfig::default();
        config.script.path = Some(path);
        config.supervisor.freeze_threshold_ms = 300;
        (dir, config)
    }

    #[test]
    fn healthy_script_reports_next_tick() {
        let (_dir, config) = config_for("return function(elapsed) return 0.5 end");

        let report = check_script(&config).expect("check should pass");

        assert_eq!(report.next, NextTick::After(Duration::from_millis(500)));
        assert!(report.summary().contains("next tick in 0.500s"));
    }

    #[test]
    fn stop_is_a_valid_outcome() {
        let (_dir, config) = config_for("return function() return 'stop' end");

        let report = check_script(&config).expect("check should pass");

        assert_eq!(report.next, NextTick::Stop);
    }

    #[test]
    fn missing_tick_function_fails_setup() {
        let (_dir, config) = config_for("return 42");

        let err = check_script(&config).expect_err("check should fail");

        assert!(matches!(err, ScriptError::Setup(_)));
    }

    #[test]
    fn tick_error_is_reported() {
        let (_dir, config) = config_for("return function() error('boom') end");

        let err = check_script(&config).expect_err("check should fail");

        assert!(matches!(err, ScriptError::Runtime(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn runaway_tick_is_cancelled() {
        let (_dir, config) = config_for("return function() while true do end end");

        let err = check_script(&config).expect_err("check should fail");

        assert!(matches!(err, ScriptError::Cancelled));
    }

    #[test]
    fn control_writes_run_against_the_empty_directory() {
        let (_dir, config) = config_for(
            r#"
            local fan, err = hw.control("Fans / Fan 1")
            assert(fan == nil and err ~= nil)
            hw.set_state("checked")
            return function() return hw.get_state() == "checked" and 1 or "stop" end
            "#,
        );

        let report = check_script(&config).expect("check should pass");

        assert_eq!(report.next, NextTick::After(Duration::from_secs(1)));
    }
}

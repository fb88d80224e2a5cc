//! Script thread body.

use super::engine::{NextTick, ScriptEngine, ScriptEnv, ScriptInstance, ScriptSender};
use super::handle::ScriptHandle;
use super::{Shared, SupervisorState};
use crate::error::{ErrorCode, ScriptError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, info, trace};

impl<E: ScriptEngine> Shared<E> {
    /// Entry point of the `hws-script` thread.
    pub(super) fn run_instance(&self, handle: &ScriptHandle) {
        let generation = handle.generation();
        match panic::catch_unwind(AssertUnwindSafe(|| self.drive(handle))) {
            Ok(Ok(())) => debug!(generation, "Script loop exited"),
            Ok(Err(e)) if handle.cancel_token().is_cancelled() => {
                info!(generation, error = %e, "Script instance cancelled");
            }
            Ok(Err(e)) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    generation,
                    code = e.code(),
                    error = %e,
                    "Script instance failed; not restarting"
                );
            }
            Err(_) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                error!(generation, "Script thread panicked; not restarting");
            }
        }
        self.retire(handle);
    }

    fn keeps_running(&self, handle: &ScriptHandle) -> bool {
        self.state.load() == SupervisorState::Running && !handle.cancel_token().is_cancelled()
    }

    fn drive(&self, handle: &ScriptHandle) -> Result<(), ScriptError> {
        let generation = handle.generation();
        let heartbeat = handle.heartbeat();
        let env = ScriptEnv::new(
            handle.clone(),
            Arc::clone(&self.main_queue),
            ScriptSender::new(Arc::clone(&self.script_queue), generation),
        );

        heartbeat.beat();
        let mut instance = self.engine.instantiate(&env)?;
        debug!(generation, setup_ms = elapsed_ms(handle), "Script setup complete");

        loop {
            if !self.keeps_running(handle) {
                return Ok(());
            }
            heartbeat.beat();

            for tagged in self.script_queue.drain_all() {
                if tagged.generation.is_some_and(|g| g != generation) {
                    trace!(generation, task_generation = ?tagged.generation, "Dropping stale script task");
                    continue;
                }
                if handle.cancel_token().is_cancelled() {
                    return Err(ScriptError::Cancelled);
                }
                instance.run_task(tagged.task)?;
            }

            if !self.keeps_running(handle) {
                return Ok(());
            }
            let next = instance.tick(handle.elapsed())?;
            self.counters.ticks.fetch_add(1, Ordering::Relaxed);
            if handle.cancel_token().is_cancelled() {
                return Err(ScriptError::Cancelled);
            }

            match next {
                NextTick::Stop => {
                    info!(generation, elapsed_ms = elapsed_ms(handle), "Script requested stop");
                    return Ok(());
                }
                NextTick::After(delay) => {
                    heartbeat.park();
                    self.script_queue.wait(delay);
                }
            }
        }
    }
}

fn elapsed_ms(handle: &ScriptHandle) -> u64 {
    u64::try_from(handle.elapsed().as_millis()).unwrap_or(u64::MAX)
}

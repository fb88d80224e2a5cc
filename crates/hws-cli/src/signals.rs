//! OS signal handling for the host process.
//!
//! Signals are received on a dedicated thread running a current-thread tokio
//! runtime, so neither the primary thread nor the script thread ever runs
//! async code.
//!
//! ## Unix
//! - **SIGINT**, **SIGTERM**, **SIGQUIT** (and Ctrl-C): stop the dispatcher
//! - **SIGHUP**: restart the script
//!
//! ## Other platforms
//! Only Ctrl-C is handled.

use hws_runtime::DispatcherHandle;
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

pub const SIGNAL_THREAD_NAME: &str = "hws-signals";

/// What a received signal asks the host to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Shutdown,
    Restart,
}

/// Applies `action` to the dispatcher. Returns `true` if the listener should keep running.
pub fn apply(handle: &DispatcherHandle, action: SignalAction) -> bool {
    match action {
        SignalAction::Shutdown => {
            info!("Shutdown signal received");
            handle.stop();
            false
        }
        SignalAction::Restart => {
            info!("Restart signal received");
            handle.request_restart();
            true
        }
    }
}

/// Spawns the signal listener thread.
///
/// The thread ends after the first shutdown signal, or when signal
/// registration fails (logged).
///
/// # Errors
///
/// Returns an error if the thread or its runtime cannot be created.
pub fn spawn_listener(handle: DispatcherHandle) -> io::Result<JoinHandle<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name(SIGNAL_THREAD_NAME.to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    match next_signal().await {
                        Ok(action) => {
                            if !apply(&handle, action) {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Signal handling unavailable");
                            break;
                        }
                    }
                }
            });
        })
}

#[cfg(unix)]
async fn next_signal() -> io::Result<SignalAction> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let action = tokio::select! {
        _ = tokio::signal::ctrl_c() => SignalAction::Shutdown,
        _ = sigint.recv() => SignalAction::Shutdown,
        _ = sigterm.recv() => SignalAction::Shutdown,
        _ = sigquit.recv() => SignalAction::Shutdown,
        _ = sighup.recv() => SignalAction::Restart,
    };
    Ok(action)
}

#[cfg(not(unix))]
async fn next_signal() -> io::Result<SignalAction> {
    tokio::signal::ctrl_c().await?;
    Ok(SignalAction::Shutdown)
}

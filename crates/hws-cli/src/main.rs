//! hwscript - keeps a Lua hardware automation script alive
//!
//! # Commands
//!
//! - `hwscript run` (default): runs the host. The primary dispatcher owns the
//!   process main thread, the script runs on its own supervised thread and
//!   the event bus listens on `127.0.0.1:9081`.
//! - `hwscript check`: loads the script, runs setup and one tick with
//!   hardware stubbed out. Exits with status 1 on failure.
//! - `hwscript config`: prints the resolved configuration as TOML.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`HWS_*`)
//! 3. Explicit config file (`--config PATH`)
//! 4. Global config (`<config_dir>/hwscript/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `HWS_SCRIPT`: Script entry file
//! - `HWS_DEBUG`: Enable debug mode (`true`/`false`)
//! - `HWS_BUS_ENABLED`: Start the WebSocket event bus
//! - `HWS_BUS_BIND`: Event bus listen address
//! - `HWS_FREEZE_THRESHOLD_MS`: Freeze detection threshold
//! - `HWS_STATE_FILE`: Persisted script state location
//! - `HWS_LOG_FILE`: Also write logs to `<log_dir>/hwscript.log`

mod check;
mod signals;
mod tracing_writer;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use hws_bus::{BusServer, EventBus};
use hws_lua::{route_bus_events, HostServices, LuaEngine};
use hws_runtime::collab::FileStateStore;
use hws_runtime::config::{ConfigError, ConfigLoader, HwsConfig, LoggingConfig};
use hws_runtime::{Dispatcher, MainQueue, Supervisor};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file name inside the log directory.
const LOG_FILE_NAME: &str = "hwscript.log";

/// hwscript - Lua hardware automation host
#[derive(Parser, Debug)]
#[command(name = "hwscript")]
#[command(version, about, long_about = None)]
struct Args {
    /// Additional config file, layered over the global one
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to DIR/hwscript.log (also: HWS_LOG_FILE)
    #[arg(long, global = true, value_name = "DIR")]
    log_file: Option<PathBuf>,

    /// Event bus listen address (also: HWS_BUS_BIND)
    #[arg(long, global = true, value_name = "ADDR")]
    bus_bind: Option<SocketAddr>,

    /// Do not start the event bus
    #[arg(long, global = true)]
    no_bus: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Run the script host (default)
    Run(ScriptArgs),
    /// Load the script and run a single tick without hardware
    Check(ScriptArgs),
    /// Print the resolved configuration
    Config,
}

#[derive(ClapArgs, Debug, Clone, Default, PartialEq, Eq)]
struct ScriptArgs {
    /// Script entry file (also: HWS_SCRIPT)
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,
}

impl Args {
    fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(ScriptArgs::default()))
    }
}

/// CLI-based configuration resolver.
///
/// Merges file/env config via [`ConfigLoader`] and applies CLI argument
/// overrides as the highest-priority layer.
struct CliConfigResolver {
    loader: ConfigLoader,
    debug: bool,
    script: Option<PathBuf>,
    log_file: Option<PathBuf>,
    bus_bind: Option<SocketAddr>,
    no_bus: bool,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let mut loader = ConfigLoader::new();
        if let Some(ref path) = args.config {
            loader = loader.with_config_file(path);
        }
        let script = match args.command() {
            Command::Run(s) | Command::Check(s) => s.script,
            Command::Config => None,
        };

        Self {
            loader,
            debug: args.debug,
            script,
            log_file: args.log_file.clone(),
            bus_bind: args.bus_bind,
            no_bus: args.no_bus,
        }
    }

    fn resolve(&self) -> Result<HwsConfig, ConfigError> {
        let mut config = self.loader.load()?;

        // CLI args override (highest priority)
        if self.debug {
            config.debug = true;
        }
        if let Some(ref p) = self.script {
            config.script.path = Some(p.clone());
        }
        if let Some(ref dir) = self.log_file {
            config.logging.file = true;
            config.logging.dir = Some(dir.clone());
        }
        if let Some(addr) = self.bus_bind {
            config.bus.bind = addr;
        }
        if self.no_bus {
            config.bus.enabled = false;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = CliConfigResolver::from_args(&args);

    // Resolved before tracing starts: logging settings come from it.
    let config = resolver
        .resolve()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    init_tracing(&args, &config);

    match args.command() {
        Command::Run(_) => run_host(&config),
        Command::Check(_) => {
            match check::check_script(&config) {
                Ok(report) => println!("{}", report.summary()),
                Err(e) => {
                    eprintln!("{}: {e}", config.script.resolved_path().display());
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Command::Config => {
            let toml = config.to_toml().context("Failed to serialize config")?;
            print!("{toml}");
            Ok(())
        }
    }
}

/// Installs independent terminal and file layers.
///
/// Terminal filter: --debug > --verbose > RUST_LOG env > default "info".
/// File filter: `logging.file_level` (default "debug").
fn init_tracing(args: &Args, config: &HwsConfig) {
    let terminal_filter = terminal_filter(args.debug || config.debug, args.verbose);
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_file = if config.logging.file {
        open_log_file(&config.logging.resolved_dir())
    } else {
        None
    };

    if let Some(file) = log_file {
        let file_filter = EnvFilter::new(&config.logging.file_level);
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_writer::FileMakeWriter::new(file));

        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .with(file_layer.with_filter(file_filter))
            .init();
        log_file_enabled(&config.logging);
    } else {
        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .init();
    }
}

fn terminal_filter(debug: bool, verbose: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug,tokio=warn,tungstenite=warn,tokio_tungstenite=warn")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn log_file_enabled(logging: &LoggingConfig) {
    info!(
        path = %logging.resolved_dir().join(LOG_FILE_NAME).display(),
        level = %logging.file_level,
        "File logging enabled"
    );
}

/// Opens the persistent log file in the given directory.
///
/// Creates `<log_dir>/hwscript.log` in append mode.
/// Returns `None` if the directory/file cannot be created (non-fatal).
fn open_log_file(log_dir: &Path) -> Option<Arc<parking_lot::Mutex<std::fs::File>>> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: cannot create log directory {}: {e}",
            log_dir.display()
        );
        return None;
    }

    let log_path = log_dir.join(LOG_FILE_NAME);

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => Some(Arc::new(parking_lot::Mutex::new(file))),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {e}", log_path.display());
            None
        }
    }
}

/// Wires the host together and runs the dispatcher on the calling thread.
fn run_host(config: &HwsConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "hwscript starting");

    let bus = Arc::new(EventBus::new());
    let state = Arc::new(FileStateStore::new(config.state.resolved_file()));
    let host = HostServices::detached()
        .with_state(state)
        .with_bus(Arc::clone(&bus));

    // The transport runtime must be built outside any tokio context.
    let server = if config.bus.enabled {
        match BusServer::start(Arc::clone(&bus), config.bus.bind) {
            Ok(server) => Some(server),
            Err(e) => {
                warn!(error = %e, "Event bus unavailable; continuing without it");
                None
            }
        }
    } else {
        info!("Event bus disabled");
        None
    };

    let engine = LuaEngine::from_config(config, host);
    info!(script = %engine.script().display(), "Script selected");
    let supervisor = Supervisor::new(engine, config.supervisor.clone(), Arc::new(MainQueue::new()));
    route_bus_events(&bus, supervisor.clone());

    let dispatcher = Dispatcher::new(supervisor.clone(), &config.dispatcher);
    let _signals =
        signals::spawn_listener(dispatcher.handle()).context("Failed to start signal listener")?;

    // A script that fails to start leaves the host up for a later restart.
    if let Err(e) = supervisor.start() {
        error!(error = %e, "Script failed to start");
    }

    dispatcher.run();

    bus.clear_handler();
    if let Some(server) = server {
        server.shutdown();
    }
    let stats = supervisor.stats();
    info!(
        ticks = stats.ticks,
        failures = stats.failures,
        freeze_restarts = stats.freeze_restarts,
        "hwscript stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Helper: a resolver whose global config lives in an empty temp dir.
    fn resolver_with(tmp: &TempDir) -> CliConfigResolver {
        CliConfigResolver {
            loader: ConfigLoader::new()
                .with_global_config(tmp.path().join("config.toml"))
                .skip_env_vars(),
            debug: false,
            script: None,
            log_file: None,
            bus_bind: None,
            no_bus: false,
        }
    }

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn resolve_defaults_no_overrides() {
        let tmp = TempDir::new().expect("create temp dir");
        let config = resolver_with(&tmp).resolve().expect("resolve should succeed");

        assert_eq!(config, HwsConfig::default());
    }

    #[test]
    fn resolve_cli_overrides() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut resolver = resolver_with(&tmp);
        resolver.debug = true;
        resolver.script = Some(PathBuf::from("/scripts/fans.lua"));
        resolver.log_file = Some(PathBuf::from("/var/log/hwscript"));
        resolver.bus_bind = Some("127.0.0.1:9999".parse().expect("valid addr"));
        resolver.no_bus = true;

        let config = resolver.resolve().expect("resolve should succeed");

        assert!(config.debug);
        assert_eq!(config.script.path, Some(PathBuf::from("/scripts/fans.lua")));
        assert!(config.logging.file);
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/hwscript")));
        assert_eq!(config.bus.bind.port(), 9999);
        assert!(!config.bus.enabled);
    }

    #[test]
    fn cli_overrides_beat_config_file() {
        let tmp = TempDir::new().expect("create temp dir");
        std::fs::write(
            tmp.path().join("config.toml"),
            "[script]\npath = \"/from/file.lua\"\n\n[bus]\nenabled = false\n",
        )
        .expect("write config");
        let mut resolver = resolver_with(&tmp);
        resolver.script = Some(PathBuf::from("/from/cli.lua"));

        let config = resolver.resolve().expect("resolve should succeed");

        assert_eq!(config.script.path, Some(PathBuf::from("/from/cli.lua")));
        assert!(!config.bus.enabled);
    }

    /// CLI flag=false does NOT override file config values.
    #[test]
    fn false_flags_preserve_loader_values() {
        let tmp = TempDir::new().expect("create temp dir");
        std::fs::write(tmp.path().join("config.toml"), "debug = true\n").expect("write config");

        let config = resolver_with(&tmp).resolve().expect("resolve should succeed");

        assert!(config.debug);
        assert!(config.bus.enabled);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut resolver = resolver_with(&tmp);
        resolver.loader = resolver.loader.with_config_file(tmp.path().join("absent.toml"));

        assert!(resolver.resolve().is_err());
    }

    #[test]
    fn run_is_the_default_command() {
        let args = parse(&["hwscript"]);

        assert_eq!(args.command(), Command::Run(ScriptArgs::default()));
        assert!(!args.debug);
        assert!(!args.no_bus);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = parse(&[
            "hwscript",
            "check",
            "--script",
            "/tmp/s.lua",
            "--debug",
            "--no-bus",
            "--bus-bind",
            "127.0.0.1:7000",
        ]);

        assert_eq!(
            args.command(),
            Command::Check(ScriptArgs {
                script: Some(PathBuf::from("/tmp/s.lua"))
            })
        );
        assert!(args.debug);
        assert!(args.no_bus);
        assert_eq!(args.bus_bind, Some("127.0.0.1:7000".parse().expect("valid addr")));
    }

    #[test]
    fn from_args_carries_script_and_flags() {
        let args = parse(&[
            "hwscript",
            "--log-file",
            "/tmp/logs",
            "run",
            "--script",
            "main.lua",
        ]);
        let resolver = CliConfigResolver::from_args(&args);

        assert_eq!(resolver.script, Some(PathBuf::from("main.lua")));
        assert_eq!(resolver.log_file, Some(PathBuf::from("/tmp/logs")));
        assert!(!resolver.debug);
        assert!(!resolver.no_bus);
    }

    #[test]
    fn config_command_has_no_script() {
        let args = parse(&["hwscript", "config"]);
        let resolver = CliConfigResolver::from_args(&args);

        assert_eq!(args.command(), Command::Config);
        assert!(resolver.script.is_none());
    }

    #[test]
    fn invalid_bus_address_is_rejected() {
        assert!(Args::try_parse_from(["hwscript", "--bus-bind", "not-an-addr"]).is_err());
    }

    #[test]
    fn open_log_file_creates_directory() {
        let tmp = TempDir::new().expect("create temp dir");
        let dir = tmp.path().join("nested").join("logs");

        assert!(open_log_file(&dir).is_some());
        assert!(dir.join(LOG_FILE_NAME).exists());
    }
}

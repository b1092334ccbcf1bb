//! # ESP_33 Emulator
//!
//! Broadcasts the `ESP_33` stability-control status message on a CAN bus
//! through an SLCAN adapter, so a brake-assist module that expects it keeps
//! running without a diagnostic fault.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (defaults when no file is given)
//!    - Set up logging with tracing subscriber
//!    - Open the SLCAN adapter; on failure wait and restart
//!    - Arm the watchdog
//!
//! 2. **Main Loop**
//!    - Send ESP_33 every broadcast period (200 ms by default)
//!    - Service the development console when enabled
//!    - Feed the watchdog every healthy tick
//!
//! 3. **Exit**
//!    - Ctrl+C: clean shutdown
//!    - Too many failed sends: process restart
//!
//! # Examples
//!
//! ```bash
//! esp33-emulator config/default.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use esp33_emulator::config::{Config, LoggingConfig};
use esp33_emulator::console::{self, commands::help_lines};
use esp33_emulator::host;
use esp33_emulator::runtime::{Emulator, LoopExit};
use esp33_emulator::serial::SlcanTransport;
use esp33_emulator::supervisor::{RestartRequest, ThreadWatchdog};

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "esp33-emulator.log";

const USAGE: &str = "\
esp33-emulator - ESP_33 CAN message emulator

USAGE:
  esp33-emulator [CONFIG]
  esp33-emulator --help
  esp33-emulator --version

ARGS:
  CONFIG            TOML configuration file (defaults are used when omitted)

OPTIONS:
  -h, --help        Show this help
  -V, --version     Show version
";

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run { config: Option<PathBuf> },
    Help,
    Version,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Invocation, String> {
    let mut config = None;

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "-V" | "--version" => return Ok(Invocation::Version),
            flag if flag.starts_with('-') => return Err(format!("Unknown option '{}'", flag)),
            path => {
                if config.is_some() {
                    return Err(format!("Unexpected argument '{}'", path));
                }
                config = Some(PathBuf::from(path));
            }
        }
    }

    Ok(Invocation::Run { config })
}

/// Install the tracing subscriber
///
/// Logs go to stderr so stdout stays reserved for the console. `RUST_LOG`
/// overrides the configured level.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if config.directory.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Run { config }) => config,
        Ok(Invocation::Help) => {
            print!("{}", USAGE);
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("esp33-emulator {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Err(msg) => {
            eprint!("{}\n\n{}", msg, USAGE);
            std::process::exit(2);
        }
    };

    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let log_guard = init_logging(&config.logging);

    info!("ESP_33 emulator v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Broadcasting 0x{:03X} every {} ms, restart after {} failed sends",
        config.broadcast.can_id, config.broadcast.period_ms, config.broadcast.max_retry_count
    );

    let transport = match SlcanTransport::open(&config.transport).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("CAN adapter bring-up failed: {}", e);
            error!("Restarting in {} ms...", config.recovery.restart_delay_ms);
            tokio::time::sleep(Duration::from_millis(config.recovery.restart_delay_ms)).await;
            drop(log_guard);
            host::restart(RestartRequest::unsupervised());
        }
    };
    info!("CAN adapter ready at: {}", transport.device_path());

    let mut emulator = Emulator::new(&config, transport, ThreadWatchdog::new(), Instant::now());

    if config.console.enabled {
        for line in help_lines() {
            println!("{}", line);
        }
        emulator.attach_console(console::spawn_stdin_reader(), |line| println!("{}", line));
        info!("Development console enabled");
    }

    info!("Press Ctrl+C to exit");

    match emulator.run(tokio::signal::ctrl_c()).await {
        LoopExit::Shutdown => {
            info!("ESP_33 emulator stopped");
            Ok(())
        }
        LoopExit::Restart(request) => {
            drop(log_guard);
            host::restart(request)
        }
    }
}

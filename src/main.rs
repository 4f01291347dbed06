//! # Revolute Node
//!
//! Host runner for one chain node.
//!
//! Opens the node's serial devices, brings the local actuator up and then
//! serves master commands until Ctrl+C.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use revolute_node::config::Config;
use revolute_node::node::Node;
use revolute_node::pins::HostPins;
use revolute_node::serial::SerialTransceiver;
use revolute_node::timeout::{TimeoutFlag, TimeoutService, TokioTimer};

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How long shutdown waits for the node loop before abandoning it
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Main entry point for the node runner
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Open the upstream and child serial ports
///
/// 2. **Main Loop**
///    - Runs on a blocking thread: actuator bring-up, then master commands
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded or is invalid
/// - The upstream serial port cannot be opened
/// - The transceiver fails while the node is running
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
fn main() -> Result<()> {
    let config = load_config(std::env::args().nth(1))?;
    let _guard = init_logging(&config);

    info!("Revolute node v{} starting...", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;

    let result = runtime.block_on(serve(config));

    // A node stuck in bring-up never returns; don't wait on it forever
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

/// Load the configuration named on the command line, or the default one
fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load configuration from {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load configuration from {}", DEFAULT_CONFIG_PATH)),
        None => Ok(Config::default()),
    }
}

/// Build the log filter: `RUST_LOG` wins over the configured level
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize logging to stdout and, when configured, a daily log file
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = log_filter(&config.logging.level);

    match &config.logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "revolute-node.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Build the node and run it until it fails or Ctrl+C arrives
async fn serve(config: Config) -> Result<()> {
    let transceiver = SerialTransceiver::open(&config.serial)?;

    let flag = TimeoutFlag::new();
    let timer = TokioTimer::new(tokio::runtime::Handle::current(), flag.clone());
    let timeouts = TimeoutService::new(timer, flag, config.timer_periods());
    let mut node = Node::new(transceiver, timeouts, HostPins::new(), config.actuator_settings());

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let mut worker = tokio::task::spawn_blocking(move || node.run(&worker_stop));

    info!("Press Ctrl+C to exit");

    tokio::select! {
        joined = &mut worker => {
            joined.context("Node loop panicked")??;
            Ok(())
        }

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            stop.store(true, Ordering::Release);

            match tokio::time::timeout(SHUTDOWN_GRACE, worker).await {
                Ok(joined) => joined.context("Node loop panicked")??,
                Err(_) => warn!("Node loop still busy in actuator bring-up, abandoning it"),
            }
            Ok(())
        }
    }
}

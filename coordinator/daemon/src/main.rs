//! BayMax Face Daemon
//!
//! Runs the face coordinator as a standalone process. The voice pipeline, the
//! navigation bridge, the control panel and the face renderer all connect over
//! one Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults ($XDG_RUNTIME_DIR/baymax/face.sock)
//! baymax-daemon
//!
//! # Custom socket and config
//! baymax-daemon --socket-path /tmp/face.sock --config ./face.toml
//!
//! # Blink every 4s while idle, mirror telemetry
//! baymax-daemon --idle-blink-ms 4000 --telemetry
//!
//! # Verbose logging
//! RUST_LOG=debug baymax-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

mod server;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use baymax_core::{default_config_path, load_config_from_path, ConfigOverrides};
use server::DaemonServer;

/// BayMax face daemon - expression state coordinator behind a Unix socket
#[derive(Parser, Debug)]
#[command(name = "baymax-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Unix socket path for client connections
    #[arg(short = 's', long, value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "BAYMAX_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Idle blink period in milliseconds (0 disables)
    #[arg(long, value_name = "MS")]
    idle_blink_ms: Option<u64>,

    /// Mirror render commands as published events
    #[arg(long)]
    telemetry: bool,

    /// Maximum concurrent client connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "BAYMAX_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.socket_path {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(ms) = self.idle_blink_ms {
            overrides = overrides.with_idle_blink_interval_ms(ms);
        }
        if self.telemetry {
            overrides = overrides.with_telemetry_enabled(true);
        }
        if let Some(max) = self.max_connections {
            overrides = overrides.with_max_connections(max);
        }
        overrides
    }
}

/// Initialize logging; `RUST_LOG` wins over `level`
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("baymax_daemon={level},baymax_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), pid = std::process::id(), "BayMax daemon starting");

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid command-line overrides")?;

    info!(
        source = %config.source(),
        socket_path = ?config.socket_path,
        telemetry = config.telemetry_enabled,
        idle_blink_ms = config
            .coordinator
            .blink_interval
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        "Configuration resolved"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let shutdown_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
        shutdown_flag.store(true, Ordering::SeqCst);
    });

    let socket_path = config.socket_path.clone();
    let mut server = DaemonServer::new(config);
    let result = server.run(shutdown).await;

    // Covers early exits where the server never reached its own cleanup
    if socket_path.exists() {
        if let Err(e) = fs::remove_file(&socket_path) {
            warn!(error = %e, "Failed to remove socket file");
        }
    }

    match result {
        Ok(()) => {
            info!(connections = server.connection_count(), "BayMax daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

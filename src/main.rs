#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # rutlink
//!
//! Cellular gateway integration for a vehicle ground station.
//!
//! rutlink logs into the gateway's ubus JSON-RPC endpoint, polls modem
//! signal status and relays it to the vehicle telemetry links, keeps the
//! gateway's SMS auto-reply templates current with the vehicle position, and
//! turns `!!` SMS commands into vehicle commands.
//!
//! ## Subcommands
//!
//! - `rutlink serve` (default): run the integration and its HTTP hook
//!
//! ## API surface
//!
//! | Method | Path          | Description                                   |
//! |--------|---------------|-----------------------------------------------|
//! | GET    | `/sms`        | Inbound SMS hook (`sender`, base64 `message`) |
//! | GET    | `/api/health` | Liveness check                                |
//! | GET    | `/api/status` | Modem snapshot, session and modem state       |
//!
//! Operator commands (`start`, `stop`, `status`, `set <key> <value>`) are
//! read line by line from stdin.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use rutlink::{control, gateway, routes, AppState, Config, Detached, Gateway};

/// Cellular gateway integration for a vehicle ground station.
#[derive(Parser)]
#[command(name = "rutlink", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the integration (default when no subcommand given).
    Serve {
        /// Start ticking immediately instead of waiting for `start`.
        #[arg(long)]
        autostart: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let autostart = matches!(cli.command, Some(Commands::Serve { autostart: true }));

    let code = match run(cli.config.as_deref(), autostart).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("rutlink: {e}");
            1
        }
    };
    // A console read may still be pending on stdin; leave without waiting for it.
    std::process::exit(code);
}

async fn run(config_path: Option<&str>, autostart: bool) -> Result<(), String> {
    let config = Config::load(config_path)?;

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("rutlink v{} starting", env!("CARGO_PKG_VERSION"));
    match config.gateway.base_url() {
        Some(url) => info!("Gateway: {url}"),
        None => warn!("No router configured; use `set router <host>` before `start`"),
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gateway.timeout_secs))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

    // No vehicle transport is linked into the binary; commands and link
    // telemetry are logged only.
    let detached = Arc::new(Detached::new());
    let gateway = Arc::new(Gateway::new(
        config.settings(),
        http,
        detached.clone(),
        detached,
    ));

    if autostart {
        if let Err(reason) = gateway.start().await {
            warn!("Autostart: {reason}");
        }
    }

    let app = routes::router(AppState {
        gateway: gateway.clone(),
    });
    let listener = TcpListener::bind(&config.server.listen)
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", config.server.listen))?;
    info!("Listening on {}", config.server.listen);

    let tick_task = gateway::spawn_tick_loop(gateway.clone());
    let console_task = control::spawn_console(gateway.clone());

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Failed to register SIGTERM: {e}");
                    ctrl_c.await.ok();
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    // Cleanup
    info!("Shutting down...");
    tick_task.abort();
    console_task.abort();
    gateway.stop().await;

    if let Err(e) = served {
        error!("Server error: {e}");
        return Err(format!("Server error: {e}"));
    }
    info!("Goodbye");
    Ok(())
}

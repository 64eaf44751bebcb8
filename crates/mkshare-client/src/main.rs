//! MKShare controlled-peer entry point.
//!
//! Wires together the connection to the controller and the input emulation
//! loop, then runs the Tokio async event loop.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (+ CLI overrides, client_id generated on first run)
//!  └─ ClientConnection::run()   -- connect / handshake / heartbeat / backoff
//!  └─ run_emulation()           -- LinkEvent → EmulateInputUseCase
//! ```
//!
//! # Platform input emulator
//!
//! The `MockInputEmulator` used here records all injected events rather than
//! synthesising OS input.  A platform build swaps in an OS-backed
//! `PlatformInputEmulator`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mkshare_client::application::emulate_input::{run_emulation, EmulateInputUseCase};
use mkshare_client::infrastructure::input_emulation::mock::MockInputEmulator;
use mkshare_client::infrastructure::network::{ClientConnection, ClientConnectionConfig};
use mkshare_client::infrastructure::storage::config::{self, ClientConfig};
use mkshare_core::domain::geometry::load_geometry;
use mkshare_core::protocol::ScreenInfoMessage;
use mkshare_core::{ScreenGeometry, StaticScreenEnumerator};

/// Capacity of the link-event channel between network and emulation.
const LINK_EVENT_CAPACITY: usize = 1024;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "mkshare-client", version, about = "Be controlled by an MKShare controller")]
struct Cli {
    /// Path to client.toml; defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller hostname or IP, overriding the config file.
    #[arg(long, env = "MKSHARE_SERVER")]
    server: Option<String>,

    /// Controller port, overriding the config file.
    #[arg(long, env = "MKSHARE_PORT")]
    port: Option<u16>,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::config_file_path().context("locating client config"),
        }
    }

    fn apply_overrides(&self, cfg: &mut ClientConfig) {
        if let Some(server) = &self.server {
            cfg.network.server_host = server.clone();
        }
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config_path()?;
    let mut cfg = config::load_config(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.client.log_level)),
        )
        .init();

    info!("MKShare client starting");

    // The identity is persisted before CLI overrides are applied so that
    // one-off flags never end up in the file.
    let (client_id, generated) = cfg.ensure_client_id();
    if generated {
        match config::save_config(&path, &cfg) {
            Ok(()) => info!(%client_id, path = %path.display(), "generated client id"),
            Err(e) => warn!(error = %e, "could not persist generated client id"),
        }
    }
    cli.apply_overrides(&mut cfg);

    let geometry = load_geometry(&StaticScreenEnumerator::single_1080p()).unwrap_or_else(|e| {
        error!(error = %e, "screen enumeration failed; assuming 1920x1080");
        ScreenGeometry::single(1920, 1080)
    });
    let screen = ScreenInfoMessage::from(geometry.primary());
    let use_case = EmulateInputUseCase::new(Arc::new(MockInputEmulator::new()), geometry);

    let connection = ClientConnection::new(ClientConnectionConfig {
        server_addr: cfg.server_addr(),
        client_id,
        liveness: cfg.liveness(),
        handshake_timeout: cfg.handshake_timeout(),
        reconnect: cfg.reconnect_policy(),
        screen,
    });

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
    let emulation = tokio::spawn(run_emulation(use_case, events_rx, cancel.clone()));

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C; shutting down"),
        }
        ctrl_c.cancel();
    });

    info!(server = %cfg.server_addr(), "connecting to controller");
    let final_state = connection.run(events_tx, cancel.clone()).await;
    info!(state = %final_state, "connection loop finished");

    // The retry budget may have run out without a Ctrl-C.
    cancel.cancel();
    emulation.await.context("emulation task")?;

    info!("MKShare client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

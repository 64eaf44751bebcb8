//! MKShare controller entry point.
//!
//! Wires together the infrastructure services and starts the Tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (+ CLI overrides)
//!  └─ EventRouter            -- ownership machine, recall key, sink
//!  └─ start services
//!       ├─ PeerListener       (TCP accept + one session task)
//!       ├─ pointer sampler    (interval task, edge dwell)
//!       └─ capture pump       (captured input → router)
//! ```
//!
//! # Usage
//!
//! ```text
//! mkshare-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Config file [default: platform config dir]
//!   --port   <PORT>   Listen port override          [env: MKSHARE_PORT]
//!   --bind   <ADDR>   Bind address override         [env: MKSHARE_BIND]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mkshare_core::{ScreenGeometry, StaticScreenEnumerator};
use mkshare_server::application::route_input::{run_capture_pump, EventRouter};
use mkshare_server::application::sample_pointer::run_pointer_sampler;
use mkshare_server::infrastructure::cursor::RecordingCursor;
use mkshare_server::infrastructure::input_capture::mock::MockInputSource;
use mkshare_server::infrastructure::input_capture::InputSource;
use mkshare_server::infrastructure::network::{PeerListener, PeerSlot, SessionSettings};
use mkshare_server::infrastructure::storage::config::{self, ServerConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "mkshare-server", version, about = "Share this machine's keyboard and mouse")]
struct Cli {
    /// Path to server.toml; defaults to the platform config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port to listen on, overriding the config file.
    #[arg(long, env = "MKSHARE_PORT")]
    port: Option<u16>,

    /// Address to bind, overriding the config file.
    #[arg(long, env = "MKSHARE_BIND")]
    bind: Option<String>,
}

impl Cli {
    fn load(&self) -> anyhow::Result<ServerConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config::config_file_path().context("locating server config")?,
        };
        let mut cfg = config::load_config(&path)
            .with_context(|| format!("loading config from {}", path.display()))?;
        if let Some(port) = self.port {
            cfg.network.port = port;
        }
        if let Some(bind) = &self.bind {
            cfg.network.bind_address = bind.clone();
        }
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level)),
        )
        .init();

    info!("MKShare controller starting");

    let listen_addr = cfg.listen_addr().context("resolving listen address")?;
    let ownership = cfg.ownership().context("reading edge configuration")?;
    let recall_key = cfg.recall_key().context("reading recall key")?;

    // Platform hooks are not wired in this build; the headless adapters keep
    // the whole pipeline runnable.
    let geometry = mkshare_core::domain::geometry::load_geometry(
        &StaticScreenEnumerator::single_1080p(),
    )
    .unwrap_or_else(|e| {
        error!(error = %e, "screen enumeration failed; assuming 1920x1080");
        ScreenGeometry::single(1920, 1080)
    });
    let center = geometry.primary().center();
    let cursor = Arc::new(RecordingCursor::at(center.0, center.1));
    let source = Arc::new(MockInputSource::new());
    let slot = Arc::new(PeerSlot::new());

    let router = Arc::new(EventRouter::new(
        ownership,
        geometry,
        recall_key,
        slot.clone(),
        cursor.clone(),
        source.clone(),
    ));

    let cancel = CancellationToken::new();

    // ── Peer listener ─────────────────────────────────────────────────────────
    let listener = PeerListener::bind(
        listen_addr,
        Arc::clone(&slot),
        Arc::clone(&router),
        SessionSettings {
            liveness: cfg.liveness(),
            handshake_timeout: cfg.handshake_timeout(),
        },
    )
    .await
    .context("starting peer listener")?;
    info!(addr = %listener.local_addr()?, "listening for controlled peer");
    let listener_task = tokio::spawn(listener.run(cancel.clone()));

    // ── Pointer sampler ───────────────────────────────────────────────────────
    let sampler_task = tokio::spawn(run_pointer_sampler(
        Arc::clone(&router),
        cursor,
        cfg.sample_interval(),
        cancel.clone(),
    ));

    // ── Capture pump ──────────────────────────────────────────────────────────
    let events = source.start().context("starting input capture")?;
    let pump_task = tokio::spawn(run_capture_pump(Arc::clone(&router), events, cancel.clone()));

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for Ctrl-C; shutting down"),
    }
    cancel.cancel();
    source.stop();

    let (listener, sampler, pump) = tokio::join!(listener_task, sampler_task, pump_task);
    listener.context("listener task")?;
    sampler.context("pointer sampler task")?;
    pump.context("capture pump task")?;

    info!("MKShare controller stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_replace_config_values() {
        // Arrange – a config path that does not exist yields defaults
        let dir = std::env::temp_dir().join(format!("mkshare-cli-{}", std::process::id()));
        let cli = Cli::parse_from([
            "mkshare-server",
            "--config",
            dir.join("missing.toml").to_str().unwrap(),
            "--port",
            "5000",
            "--bind",
            "127.0.0.1",
        ]);

        // Act
        let cfg = cli.load().unwrap();

        // Assert
        assert_eq!(cfg.network.port, 5000);
        assert_eq!(cfg.network.bind_address, "127.0.0.1");
        assert_eq!(cfg.recall.key, "escape");
    }

    #[test]
    fn test_cli_without_overrides_keeps_defaults() {
        let cli = Cli::parse_from(["mkshare-server", "--config", "/nonexistent/server.toml"]);

        let cfg = cli.load().unwrap();

        assert_eq!(cfg.network.port, mkshare_core::protocol::DEFAULT_PORT);
    }
}

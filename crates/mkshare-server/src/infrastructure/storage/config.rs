//! TOML-based configuration for the controller.
//!
//! Default location:
//! - Windows:  `%APPDATA%\MKShare\server.toml`
//! - Linux:    `~/.config/mkshare/server.toml`
//! - macOS:    `~/Library/Application Support/MKShare/server.toml`
//!
//! ```toml
//! [server]
//! log_level = "info"
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 41234
//!
//! [edge]
//! edges = ["right"]
//! threshold_px = 5
//! dwell_ms = 300
//!
//! [recall]
//! key = "escape"
//! ```
//!
//! Every field is optional; `#[serde(default = "...")]` fills in whatever the
//! file leaves out, so a missing or empty file yields the defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mkshare_core::domain::session::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LIVENESS_MULTIPLIER,
};
use mkshare_core::protocol::{KeyCode, DEFAULT_PORT};
use mkshare_core::{Edge, LivenessConfig, OwnershipConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but makes no sense (e.g. an unknown key name).
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level controller configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub edge: EdgeSection,
    #[serde(default)]
    pub recall: RecallSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Silent heartbeat intervals before the peer is dropped (minimum 2).
    #[serde(default = "default_liveness_multiplier")]
    pub liveness_multiplier: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeSection {
    /// Screen edges that hand control to the peer, in tie-break order.
    #[serde(default = "default_edges")]
    pub edges: Vec<Edge>,
    #[serde(default = "default_threshold_px")]
    pub threshold_px: u32,
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
    /// Cursor polling period for edge detection.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecallSection {
    /// Key that returns control to this machine, e.g. `"escape"` or `"0x47"`.
    #[serde(default = "default_recall_key")]
    pub key: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64
}
fn default_liveness_multiplier() -> u32 {
    DEFAULT_LIVENESS_MULTIPLIER
}
fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64
}
fn default_edges() -> Vec<Edge> {
    vec![Edge::Right]
}
fn default_threshold_px() -> u32 {
    5
}
fn default_dwell_ms() -> u64 {
    300
}
fn default_sample_interval_ms() -> u64 {
    50
}
fn default_recall_key() -> String {
    "escape".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_multiplier: default_liveness_multiplier(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for EdgeSection {
    fn default() -> Self {
        Self {
            edges: default_edges(),
            threshold_px: default_threshold_px(),
            dwell_ms: default_dwell_ms(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl Default for RecallSection {
    fn default() -> Self {
        Self {
            key: default_recall_key(),
        }
    }
}

// ── Conversions into runtime types ────────────────────────────────────────────

impl ServerConfig {
    /// Address the peer listener binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .network
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid {
                field: "network.bind_address",
                reason: format!("{e}"),
            })?;
        Ok(SocketAddr::new(ip, self.network.port))
    }

    pub fn liveness(&self) -> LivenessConfig {
        LivenessConfig::new(
            Duration::from_millis(self.network.heartbeat_interval_ms),
            self.network.liveness_multiplier,
        )
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.network.handshake_timeout_ms)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty edge list.
    pub fn ownership(&self) -> Result<OwnershipConfig, ConfigError> {
        if self.edge.edges.is_empty() {
            return Err(ConfigError::Invalid {
                field: "edge.edges",
                reason: "at least one edge is required".to_string(),
            });
        }
        let mut edges = Vec::with_capacity(self.edge.edges.len());
        for edge in &self.edge.edges {
            if !edges.contains(edge) {
                edges.push(*edge);
            }
        }
        Ok(OwnershipConfig {
            edges,
            edge_threshold_px: self.edge.threshold_px,
            edge_dwell: Duration::from_millis(self.edge.dwell_ms),
        })
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.edge.sample_interval_ms.max(1))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the key name is not recognised.
    pub fn recall_key(&self) -> Result<KeyCode, ConfigError> {
        KeyCode::from_name(&self.recall.key).ok_or_else(|| ConfigError::Invalid {
            field: "recall.key",
            reason: format!("unknown key name {:?}", self.recall.key),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default path of the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("server.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MKShare"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("mkshare"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MKShare")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

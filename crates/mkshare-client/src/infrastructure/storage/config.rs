//! TOML-based configuration for the controlled peer.
//!
//! Default location:
//! - Windows:  `%APPDATA%\MKShare\client.toml`
//! - Linux:    `~/.config/mkshare/client.toml`
//! - macOS:    `~/Library/Application Support/MKShare/client.toml`
//!
//! ```toml
//! [client]
//! log_level = "info"
//! client_id = "6f1c0c1e-7f7a-4d7e-9d7b-2c8f9b9f0a11"
//!
//! [network]
//! server_host = "192.168.1.20"
//! port = 41234
//!
//! [reconnect]
//! base_delay_ms = 500
//! max_delay_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use mkshare_core::domain::session::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LIVENESS_MULTIPLIER,
    DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_CAP,
};
use mkshare_core::protocol::DEFAULT_PORT;
use mkshare_core::{LivenessConfig, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level controlled-peer configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Stable identity sent in the handshake.  Generated and saved on first
    /// run when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// Hostname or IP of the controller.
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_liveness_multiplier")]
    pub liveness_multiplier: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Give up after this many consecutive failures; absent means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_server_host() -> String {
    "127.0.0.1".to_string()
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
fn default_base_delay_ms() -> u64 {
    DEFAULT_RECONNECT_BASE.as_millis() as u64
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_RECONNECT_CAP.as_millis() as u64
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            client_id: None,
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            port: default_port(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_multiplier: default_liveness_multiplier(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: None,
        }
    }
}

// ── Conversions into runtime types ────────────────────────────────────────────

impl ClientConfig {
    /// `host:port` string handed to `TcpStream::connect`, which resolves it.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.network.server_host, self.network.port)
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

    /// The cap never drops below the base delay.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let base_delay = Duration::from_millis(self.reconnect.base_delay_ms);
        ReconnectPolicy {
            base_delay,
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms).max(base_delay),
            max_retries: self.reconnect.max_retries,
        }
    }

    /// Returns the configured client ID, generating one if absent.
    ///
    /// The second value is `true` when a new ID was generated and the config
    /// should be saved.
    pub fn ensure_client_id(&mut self) -> (Uuid, bool) {
        match self.client.client_id {
            Some(id) => (id, false),
            None => {
                let id = Uuid::new_v4();
                self.client.client_id = Some(id);
                (id, true)
            }
        }
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
        .map(|dir| dir.join("client.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
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
/// Returns [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = ClientConfig::default();

        assert_eq!(cfg.server_addr(), "127.0.0.1:41234");
        assert_eq!(cfg.liveness().timeout(), Duration::from_secs(3));
        let policy = cfg.reconnect_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
        assert_eq!(policy.max_retries, None);
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
[network]
server_host = "10.0.0.7"

[reconnect]
max_retries = 4
"#;

        // Act
        let cfg: ClientConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.server_addr(), "10.0.0.7:41234");
        assert_eq!(cfg.reconnect.max_retries, Some(4));
        assert_eq!(cfg.reconnect.base_delay_ms, 500);
        assert_eq!(cfg.client.log_level, "info");
    }

    #[test]
    fn test_cap_below_base_is_raised_to_base() {
        let mut cfg = ClientConfig::default();
        cfg.reconnect.base_delay_ms = 2000;
        cfg.reconnect.max_delay_ms = 100;

        assert_eq!(cfg.reconnect_policy().max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_ensure_client_id_generates_once() {
        let mut cfg = ClientConfig::default();

        let (first, generated) = cfg.ensure_client_id();
        let (second, generated_again) = cfg.ensure_client_id();

        assert!(generated);
        assert!(!generated_again);
        assert_eq!(first, second);
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("mkshare_client_test_{}", Uuid::new_v4()));
        let path = dir.join("client.toml");
        let mut cfg = ClientConfig::default();
        cfg.ensure_client_id();
        cfg.network.port = 5555;

        // Act
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/client.toml");
        assert_eq!(load_config(&path).unwrap(), ClientConfig::default());
    }
}

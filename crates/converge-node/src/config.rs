//! Configuration loading and typed config structures for a Converge node.
//!
//! The configuration lives in `converge-config.yaml` (path overridable with
//! `CONVERGE_CONFIG`). Every field has a default, so a missing file or a
//! partial one is valid. A few deployment settings can be overridden from
//! the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CONVERGE_HOST` | `server.host` |
//! | `CONVERGE_PORT` | `server.port` |
//! | `CONVERGE_PEER_ID` | `engine.peer_id` |
//! | `DRAGONFLY_URL` | `storage.dragonfly_url` |

use std::path::Path;

use converge_engine::DocumentConfig;
use converge_log::{LogConfig, StorageLimits};
use converge_relay::RelayConfig;
use converge_server::ServerConfig;
use serde::Deserialize;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "converge-config.yaml";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level node configuration.
///
/// Mirrors the structure of `converge-config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Listen address.
    #[serde(default)]
    pub server: ServerConfig,

    /// Document identity and engine tunables.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Persistent log backend and layout.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Relay fan-out and dedup settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl NodeConfig {
    /// Load configuration from a YAML file and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::InvalidEnv`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults; then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::from_file(path);
        }
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("CONVERGE_HOST") {
            self.server.host = val;
        }
        if let Some(val) = lookup("CONVERGE_PORT") {
            self.server.port = val.parse().map_err(|_parse_error| ConfigError::InvalidEnv {
                key: "CONVERGE_PORT",
                value: val.clone(),
            })?;
        }
        if let Some(val) = lookup("CONVERGE_PEER_ID") {
            self.engine.peer_id = val;
        }
        if let Some(val) = lookup("DRAGONFLY_URL") {
            self.storage.dragonfly_url = val;
        }
        Ok(())
    }
}

/// Document identity and engine tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Peer id this node authors events as.
    pub peer_id: String,
    /// Out-of-order runs held while waiting for their dependencies.
    pub gap_buffer_capacity: usize,
}

impl EngineConfig {
    /// Engine tunables in the form the document takes.
    pub const fn document(&self) -> DocumentConfig {
        DocumentConfig {
            gap_buffer_capacity: self.gap_buffer_capacity,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            peer_id: "server".to_owned(),
            gap_buffer_capacity: DocumentConfig::default().gap_buffer_capacity,
        }
    }
}

/// Which store holds the persistent log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local; lost on restart.
    #[default]
    Memory,
    /// `Dragonfly` or any Redis-compatible server.
    Dragonfly,
}

/// Persistent log backend and layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageBackend,
    /// Connection URL when `backend` is `dragonfly`.
    pub dragonfly_url: String,
    /// Key namespace, chunking, batching and lease settings.
    #[serde(flatten)]
    pub log: LogConfig,
}

impl StorageConfig {
    /// Limits the in-memory backend enforces, matching the log layout.
    pub const fn limits(&self) -> StorageLimits {
        StorageLimits {
            max_value_bytes: self.log.max_value_bytes,
            max_mutations: self.log.max_mutations,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            dragonfly_url: "redis://localhost:6379".to_owned(),
            log: LogConfig::default(),
        }
    }
}

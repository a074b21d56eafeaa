//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/synthlink/config.toml` by default.
//!
//! ```toml
//! endpoint = "127.0.0.1:6142"
//!
//! [client]
//! request_timeout_ms = 5000   # 0 waits forever
//! connect_timeout_ms = 5000
//! max_pending = 1024
//! max_line_length = 1048576
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{
    ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT,
};
use crate::endpoint::Endpoint;
use crate::error::{ClientError, ClientResult};

/// Configuration for the synthlink client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Engine endpoint (`PORT`, `HOST:PORT` or `unix:PATH`).
    pub endpoint: String,

    /// Debug mode.
    pub debug: bool,

    /// Request settings.
    pub client: ClientSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default().to_string(),
            debug: false,
            client: ClientSettings::default(),
        }
    }
}

/// Request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Reply timeout in milliseconds; 0 disables it.
    pub request_timeout_ms: u64,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum number of requests awaiting a reply.
    pub max_pending: usize,

    /// Maximum line length in bytes.
    pub max_line_length: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            max_pending: DEFAULT_MAX_PENDING,
            max_line_length: synthlink_protocol::MAX_LINE_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the defaults.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synthlink")
    }

    /// Parses the configured endpoint.
    pub fn endpoint(&self) -> ClientResult<Endpoint> {
        self.endpoint.parse()
    }

    /// Converts the `[client]` table into runtime options.
    pub fn to_options(&self) -> ClientResult<ClientOptions> {
        let settings = &self.client;
        if settings.max_pending == 0 {
            return Err(ClientError::Config("max_pending must be at least 1".into()));
        }
        if settings.max_line_length == 0 {
            return Err(ClientError::Config(
                "max_line_length must be at least 1".into(),
            ));
        }
        if settings.connect_timeout_ms == 0 {
            return Err(ClientError::Config(
                "connect_timeout_ms must be at least 1".into(),
            ));
        }

        let request_timeout = match settings.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(ClientOptions::default()
            .with_request_timeout(request_timeout)
            .with_connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .with_max_pending(settings.max_pending)
            .with_max_line_length(settings.max_line_length))
    }
}

//! Proxy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{EngineConfig, Role, MAX_MESSAGE_PADDING};

/// Which side of the obfuscated link this proxy runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Accept plaintext locally, connect out with obfs3.
    Client,
    /// Accept obfs3, connect out in plaintext.
    Server,
}

impl Mode {
    /// Engine role for connections handled in this mode.
    pub fn role(self) -> Role {
        match self {
            Mode::Client => Role::Initiator,
            Mode::Server => Role::Responder,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client" => Ok(Mode::Client),
            "server" => Ok(Mode::Server),
            other => Err(Error::config(format!("unknown mode '{}'", other))),
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Client or server side
    pub mode: Mode,
    /// Address to accept connections on
    pub listen_addr: String,
    /// Address to relay each accepted connection to
    pub remote_addr: String,
    /// Time allowed for connecting out and completing the handshake
    pub handshake_timeout: Duration,
    /// Per-connection engine settings
    pub engine: EngineConfig,
}

impl ProxyConfig {
    /// Create a configuration with default timeouts and padding.
    pub fn new(mode: Mode, listen_addr: impl Into<String>, remote_addr: impl Into<String>) -> Self {
        Self {
            mode,
            listen_addr: listen_addr.into(),
            remote_addr: remote_addr.into(),
            handshake_timeout: Duration::from_secs(30),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.is_empty() {
            return Err(Error::config("listen_addr cannot be empty"));
        }
        if self.remote_addr.is_empty() {
            return Err(Error::config("remote_addr cannot be empty"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(Error::config("handshake_timeout must be positive"));
        }
        self.engine.validate()
    }
}

/// Configuration file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyConfigFile {
    /// Client or server side
    pub mode: Mode,
    /// Listen address (host:port)
    pub listen_addr: String,
    /// Remote address (host:port)
    pub remote_addr: String,
    /// Handshake timeout (seconds)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Maximum padding per handshake message (bytes)
    #[serde(default = "default_max_padding")]
    pub max_padding: usize,
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

fn default_max_padding() -> usize {
    MAX_MESSAGE_PADDING
}

impl ProxyConfigFile {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid config file: {}", e)))
    }

    /// Render as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Convert to runtime configuration.
    pub fn to_config(&self) -> Result<ProxyConfig> {
        let config = ProxyConfig {
            mode: self.mode,
            listen_addr: self.listen_addr.clone(),
            remote_addr: self.remote_addr.clone(),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            engine: EngineConfig {
                max_padding: self.max_padding,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            mode: config.mode,
            listen_addr: config.listen_addr.clone(),
            remote_addr: config.remote_addr.clone(),
            handshake_timeout_secs: config.handshake_timeout.as_secs(),
            max_padding: config.engine.max_padding,
        }
    }
}

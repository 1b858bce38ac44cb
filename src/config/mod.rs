//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`M3DA_*`, plus `PORT` for the admin API)
//! - CLI arguments (applied by the binary on top of both)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{M3daError, Result};
use crate::protocol::DEFAULT_MAX_AUTH_ATTEMPTS;
use crate::server::{ServerConfig, DEFAULT_API_PORT, DEFAULT_MAX_MESSAGES, DEFAULT_TCP_PORT};
use crate::store::DEFAULT_FLUSH_INTERVAL_SECS;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSection,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| M3daError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| M3daError::Config(format!("Failed to parse config: {e}")))
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Apply environment overrides
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            let raw = lookup(name)?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(name, value = %raw, "ignoring invalid environment value");
                    None
                }
            }
        }

        if let Some(port) = parsed(&lookup, "M3DA_TCP_PORT") {
            self.server.tcp_port = port;
        }
        // PORT is what most hosting platforms set for the HTTP listener.
        if let Some(port) = parsed(&lookup, "M3DA_API_PORT").or_else(|| parsed(&lookup, "PORT")) {
            self.server.api_port = port;
        }
        if let Some(max) = parsed(&lookup, "M3DA_MAX_MESSAGES") {
            self.server.max_messages = max;
        }
        if let Some(path) = lookup("M3DA_SECURITY_FILE").filter(|p| !p.is_empty()) {
            self.server.security_file = Some(PathBuf::from(path));
        }
        if let Some(host) = lookup("M3DA_HOST").filter(|h| !h.is_empty()) {
            self.server.host = host;
        }
        self
    }

    /// Resolve into the runtime server configuration
    pub fn server_config(&self) -> Result<ServerConfig> {
        self.server.to_server_config()
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address both listeners bind to
    pub host: String,
    /// M3DA TCP port
    pub tcp_port: u16,
    /// Admin HTTP port
    pub api_port: u16,
    /// Read idle timeout in seconds
    pub idle_timeout_secs: u64,
    /// Failed authentications tolerated per connection
    pub max_auth_attempts: u32,
    /// Received envelopes kept per client
    pub max_messages: usize,
    /// Security profile file
    pub security_file: Option<PathBuf>,
    /// Period between security file flushes in seconds
    pub flush_interval_secs: u64,
    /// Enable CORS on the admin API
    pub cors: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            api_port: DEFAULT_API_PORT,
            idle_timeout_secs: 30,
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            max_messages: DEFAULT_MAX_MESSAGES,
            security_file: None,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            cors: true,
        }
    }
}

impl ServerSection {
    fn to_server_config(&self) -> Result<ServerConfig> {
        let host: IpAddr = self
            .host
            .parse()
            .map_err(|e| M3daError::Config(format!("Invalid host {:?}: {e}", self.host)))?;
        if self.max_messages == 0 {
            return Err(M3daError::Config("max_messages must be at least 1".to_string()));
        }

        let mut config = ServerConfig {
            tcp_addr: SocketAddr::new(host, self.tcp_port),
            api_addr: SocketAddr::new(host, self.api_port),
            ..ServerConfig::default()
        }
        .with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
        .with_max_auth_attempts(self.max_auth_attempts)
        .with_max_messages(self.max_messages)
        .with_flush_interval(Duration::from_secs(self.flush_interval_secs.max(1)));
        if let Some(path) = &self.security_file {
            config = config.with_security_file(path.clone());
        }
        if !self.cors {
            config = config.without_cors();
        }
        Ok(config)
    }
}

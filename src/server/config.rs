//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_AUTH_ATTEMPTS;
use crate::store::DEFAULT_FLUSH_INTERVAL_SECS;

/// Default M3DA TCP port
pub const DEFAULT_TCP_PORT: u16 = 44900;

/// Default admin HTTP port
pub const DEFAULT_API_PORT: u16 = 8080;

/// Default number of received envelopes kept per client
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// M3DA TCP bind address
    pub tcp_addr: SocketAddr,
    /// Admin HTTP bind address
    pub api_addr: SocketAddr,
    /// Read idle time after which a device connection is closed
    pub idle_timeout: Duration,
    /// Failed authentications tolerated per connection
    pub max_auth_attempts: u32,
    /// Received envelopes kept per client
    pub max_messages: usize,
    /// Security profile file
    pub security_file: Option<PathBuf>,
    /// Period between two security file flushes
    pub flush_interval: Duration,
    /// CORS enabled on the admin API
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            tcp_addr: SocketAddr::new(localhost, DEFAULT_TCP_PORT),
            api_addr: SocketAddr::new(localhost, DEFAULT_API_PORT),
            idle_timeout: Duration::from_secs(30),
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            max_messages: DEFAULT_MAX_MESSAGES,
            security_file: None,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            cors_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Set the M3DA TCP port
    pub fn with_tcp_port(mut self, port: u16) -> Self {
        self.tcp_addr.set_port(port);
        self
    }

    /// Set the admin HTTP port
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_addr.set_port(port);
        self
    }

    /// Bind both listeners to all interfaces
    pub fn bind_all(mut self) -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        self.tcp_addr.set_ip(any);
        self.api_addr.set_ip(any);
        self
    }

    /// Set the read idle timeout
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = attempts;
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Persist security profiles to `path`
    pub fn with_security_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.security_file = Some(path.into());
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.tcp_addr.port(), 44900);
        assert_eq!(config.api_addr.port(), 8080);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.max_messages, 10);
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default()
            .with_tcp_port(1000)
            .with_api_port(2000)
            .bind_all();
        assert_eq!(config.tcp_addr.to_string(), "0.0.0.0:1000");
        assert_eq!(config.api_addr.to_string(), "0.0.0.0:2000");
    }
}

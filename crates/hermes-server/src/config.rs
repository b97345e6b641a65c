//! Transport configuration.
//!
//! # Example
//!
//! ```rust
//! use hermes_server::{ProxyProtocolMode, ServerConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("0.0.0.0:8080")
//!     .idle_timeout(Duration::from_secs(10))
//!     .max_in_flight(Some(256))
//!     .proxy_protocol(ProxyProtocolMode::Auto)
//!     .trusted_proxy("10.0.0.0/8".parse().unwrap())
//!     .build();
//!
//! assert_eq!(config.http_addr(), "0.0.0.0:8080");
//! assert_eq!(config.max_content_length(), 5 * 1024 * 1024);
//! ```

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::forwarded::TrustedProxy;

/// Default bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default drain time on shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Default time allowed for a proxy-protocol header, in seconds.
pub const DEFAULT_PROXY_HEADER_TIMEOUT_SECS: u64 = 5;

/// Default request body limit (5 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 5 * 1024 * 1024;

/// How HAProxy PROXY headers are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocolMode {
    /// Never expected; the stream starts with HTTP.
    #[default]
    Disabled,
    /// Required on every connection.
    Enabled,
    /// Used when the stream starts with a v1 or v2 signature.
    Auto,
}

impl FromStr for ProxyProtocolMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "enabled" => Ok(Self::Enabled),
            "auto" => Ok(Self::Auto),
            other => Err(format!("unknown proxy protocol mode `{other}`")),
        }
    }
}

/// Server configuration. Use [`ServerConfig::builder()`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    http_addr: String,
    shutdown_timeout: Duration,
    idle_timeout: Duration,
    keep_alive: bool,
    max_connections: Option<usize>,
    max_in_flight: Option<usize>,
    max_content_length: usize,
    proxy_protocol: ProxyProtocolMode,
    proxy_header_timeout: Duration,
    trusted_proxies: Vec<TrustedProxy>,
}

impl ServerConfig {
    /// Starts a builder with defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// How long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Idle time after which a connection with no active request is closed.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Whether connections are reused for several requests.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Maximum open connections.
    #[must_use]
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    /// Maximum requests executing at once, server-wide.
    #[must_use]
    pub fn max_in_flight(&self) -> Option<usize> {
        self.max_in_flight
    }

    /// Maximum request body size in bytes.
    #[must_use]
    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    /// Proxy-protocol handling.
    #[must_use]
    pub fn proxy_protocol(&self) -> ProxyProtocolMode {
        self.proxy_protocol
    }

    /// Time allowed for the proxy-protocol header to arrive.
    #[must_use]
    pub fn proxy_header_timeout(&self) -> Duration {
        self.proxy_header_timeout
    }

    /// Peers whose forwarding headers are honoured.
    #[must_use]
    pub fn trusted_proxies(&self) -> &[TrustedProxy] {
        &self.trusted_proxies
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ServerConfig {
                http_addr: DEFAULT_HTTP_ADDR.to_string(),
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
                keep_alive: true,
                max_connections: None,
                max_in_flight: None,
                max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
                proxy_protocol: ProxyProtocolMode::Disabled,
                proxy_header_timeout: Duration::from_secs(DEFAULT_PROXY_HEADER_TIMEOUT_SECS),
                trusted_proxies: Vec::new(),
            },
        }
    }
}

impl ServerConfigBuilder {
    /// Creates a builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.http_addr = addr.into();
        self
    }

    /// Sets the shutdown drain time.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Enables or disables keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive = enabled;
        self
    }

    /// Limits open connections.
    #[must_use]
    pub fn max_connections(mut self, max: Option<usize>) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Limits requests executing at once; excess requests get 503.
    #[must_use]
    pub fn max_in_flight(mut self, max: Option<usize>) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// Sets the request body limit; larger bodies get 413.
    #[must_use]
    pub fn max_content_length(mut self, bytes: usize) -> Self {
        self.config.max_content_length = bytes;
        self
    }

    /// Sets proxy-protocol handling.
    #[must_use]
    pub fn proxy_protocol(mut self, mode: ProxyProtocolMode) -> Self {
        self.config.proxy_protocol = mode;
        self
    }

    /// Sets the time allowed for a proxy-protocol header.
    #[must_use]
    pub fn proxy_header_timeout(mut self, timeout: Duration) -> Self {
        self.config.proxy_header_timeout = timeout;
        self
    }

    /// Trusts forwarding headers from `proxy`.
    #[must_use]
    pub fn trusted_proxy(mut self, proxy: TrustedProxy) -> Self {
        self.config.trusted_proxies.push(proxy);
        self
    }

    /// Replaces the trusted proxies.
    #[must_use]
    pub fn trusted_proxies(mut self, proxies: Vec<TrustedProxy>) -> Self {
        self.config.trusted_proxies = proxies;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr(), DEFAULT_HTTP_ADDR);
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_content_length(), DEFAULT_MAX_CONTENT_LENGTH);
        assert_eq!(config.proxy_protocol(), ProxyProtocolMode::Disabled);
        assert!(config.keep_alive());
        assert!(config.max_in_flight().is_none());
        assert!(config.trusted_proxies().is_empty());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:9000")
            .keep_alive(false)
            .max_connections(Some(10))
            .max_in_flight(Some(4))
            .max_content_length(1024)
            .proxy_protocol(ProxyProtocolMode::Enabled)
            .trusted_proxy("127.0.0.1".parse().unwrap())
            .build();

        assert_eq!(config.socket_addr().unwrap().port(), 9000);
        assert!(!config.keep_alive());
        assert_eq!(config.max_connections(), Some(10));
        assert_eq!(config.max_in_flight(), Some(4));
        assert_eq!(config.max_content_length(), 1024);
        assert_eq!(config.trusted_proxies().len(), 1);
    }

    #[test]
    fn test_invalid_addr() {
        let config = ServerConfig::builder().http_addr("not-an-address").build();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_proxy_mode_parse() {
        assert_eq!("AUTO".parse::<ProxyProtocolMode>().unwrap(), ProxyProtocolMode::Auto);
        assert!("sometimes".parse::<ProxyProtocolMode>().is_err());
    }
}

//! The root configuration type.

use std::net::SocketAddr;

use hermes_server::TrustedProxy;
use hermes_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::{AuthSection, ConfigError, CorsSection, ServerSection};

/// Complete Hermes configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and
/// environment variables over the defaults.
///
/// # Example
///
/// ```
/// use hermes_config::HermesConfig;
///
/// let config = HermesConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.auth.bearer.is_none());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HermesConfig {
    /// Transport.
    pub server: ServerSection,

    /// Auth providers.
    pub auth: AuthSection,

    /// CORS policy.
    pub cors: CorsSection,

    /// Structured logging.
    pub logging: LogConfig,
}

impl HermesConfig {
    /// Local development: loopback address, debug logging, any CORS origin.
    ///
    /// ```
    /// use hermes_config::HermesConfig;
    ///
    /// let config = HermesConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// assert!(config.cors.enabled);
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.server.shutdown_timeout_secs = 5;
        config.logging = LogConfig::development();
        config.cors.enabled = true;
        config.cors.allowed_origins = vec!["*".to_string()];
        config
    }

    /// Production: JSON logs, PROXY headers auto-detected, bounded
    /// in-flight requests.
    ///
    /// ```
    /// use hermes_config::HermesConfig;
    /// use hermes_server::ProxyProtocolMode;
    ///
    /// let config = HermesConfig::production();
    /// assert_eq!(config.server.proxy_protocol, ProxyProtocolMode::Auto);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.server.proxy_protocol = hermes_server::ProxyProtocolMode::Auto;
        config.server.max_in_flight = Some(1024);
        config.logging = LogConfig::production();
        config.logging.format = LogFormat::Json;
        config
    }

    /// Checks values serde cannot: addresses, limits and cross-field rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_auth()?;
        self.validate_cors()?;

        hermes_telemetry::create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", server.http_addr),
            ));
        }
        if server.idle_timeout_secs == 0 {
            return Err(ConfigError::invalid_value("server.idle_timeout_secs", "must be positive"));
        }
        if server.max_content_length == 0 {
            return Err(ConfigError::invalid_value("server.max_content_length", "must be positive"));
        }
        if server.max_connections == Some(0) {
            return Err(ConfigError::invalid_value("server.max_connections", "must be positive"));
        }
        if server.max_in_flight == Some(0) {
            return Err(ConfigError::invalid_value("server.max_in_flight", "must be positive"));
        }
        for proxy in &server.trusted_proxies {
            proxy
                .parse::<TrustedProxy>()
                .map_err(|e| ConfigError::invalid_value("server.trusted_proxies", e.to_string()))?;
        }
        Ok(())
    }

    fn validate_auth(&self) -> Result<(), ConfigError> {
        if let Some(bearer) = &self.auth.bearer {
            if bearer.issuer.trim().is_empty() {
                return Err(ConfigError::invalid_value("auth.bearer.issuer", "must not be empty"));
            }
            if bearer.secret.len() < hermes_auth::MIN_SECRET_LEN {
                return Err(ConfigError::invalid_value(
                    "auth.bearer.secret",
                    format!("must be at least {} bytes", hermes_auth::MIN_SECRET_LEN),
                ));
            }
            if bearer.access_ttl_secs == 0 {
                return Err(ConfigError::invalid_value("auth.bearer.access_ttl_secs", "must be positive"));
            }
            if bearer.refresh_ttl_secs < bearer.access_ttl_secs {
                return Err(ConfigError::invalid_value(
                    "auth.bearer.refresh_ttl_secs",
                    "must not be shorter than access_ttl_secs",
                ));
            }
        }
        if let Some(basic) = &self.auth.basic {
            let mut seen = std::collections::HashSet::new();
            for user in &basic.users {
                if user.username.is_empty() || user.username.contains(':') {
                    return Err(ConfigError::invalid_value(
                        "auth.basic.users",
                        format!("invalid username `{}`", user.username),
                    ));
                }
                if !seen.insert(user.username.as_str()) {
                    return Err(ConfigError::invalid_value(
                        "auth.basic.users",
                        format!("duplicate username `{}`", user.username),
                    ));
                }
            }
        }
        if self.auth.ticket.enabled && self.auth.ticket.ttl_secs == 0 {
            return Err(ConfigError::invalid_value("auth.ticket.ttl_secs", "must be positive"));
        }
        Ok(())
    }

    fn validate_cors(&self) -> Result<(), ConfigError> {
        let cors = &self.cors;
        if !cors.enabled {
            return Ok(());
        }
        if cors.allowed_origins.is_empty() {
            return Err(ConfigError::invalid_value(
                "cors.allowed_origins",
                "at least one origin is required when CORS is enabled",
            ));
        }
        if cors.allow_credentials && cors.allowed_origins.iter().any(|o| o == "*") {
            return Err(ConfigError::invalid_value(
                "cors.allow_credentials",
                "credentials cannot be combined with the `*` origin",
            ));
        }
        for method in &cors.allowed_methods {
            http::Method::from_bytes(method.as_bytes())
                .map_err(|_| ConfigError::invalid_value("cors.allowed_methods", format!("invalid method `{method}`")))?;
        }
        for header in cors.allowed_headers.iter().chain(&cors.exposed_headers) {
            http::HeaderName::from_bytes(header.as_bytes())
                .map_err(|_| ConfigError::invalid_value("cors.allowed_headers", format!("invalid header `{header}`")))?;
        }
        Ok(())
    }
}

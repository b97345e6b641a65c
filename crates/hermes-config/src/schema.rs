//! Configuration sections.

use hermes_server::ProxyProtocolMode;
use serde::{Deserialize, Serialize};

/// Transport settings.
///
/// # Example
///
/// ```
/// use hermes_config::ServerSection;
///
/// let server = ServerSection {
///     http_addr: "127.0.0.1:9000".to_string(),
///     max_in_flight: Some(512),
///     ..Default::default()
/// };
/// assert_eq!(server.idle_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address, e.g. `0.0.0.0:8080`.
    pub http_addr: String,

    /// Drain time on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Idle connection timeout, in seconds.
    pub idle_timeout_secs: u64,

    /// Reuse connections for several requests.
    pub keep_alive: bool,

    /// Maximum open connections. Unlimited when absent.
    pub max_connections: Option<usize>,

    /// Maximum requests executing at once. Unlimited when absent.
    pub max_in_flight: Option<usize>,

    /// Request body limit in bytes.
    pub max_content_length: usize,

    /// `disabled`, `enabled` or `auto`.
    pub proxy_protocol: ProxyProtocolMode,

    /// Time allowed for the PROXY header, in seconds.
    pub proxy_header_timeout_secs: u64,

    /// Addresses or CIDR networks whose `X-Forwarded-*` headers are honoured.
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: hermes_server::config::DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout_secs: hermes_server::config::DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            idle_timeout_secs: hermes_server::config::DEFAULT_IDLE_TIMEOUT_SECS,
            keep_alive: true,
            max_connections: None,
            max_in_flight: None,
            max_content_length: hermes_server::config::DEFAULT_MAX_CONTENT_LENGTH,
            proxy_protocol: ProxyProtocolMode::Disabled,
            proxy_header_timeout_secs: hermes_server::config::DEFAULT_PROXY_HEADER_TIMEOUT_SECS,
            trusted_proxies: Vec::new(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    /// Bearer token provider. Disabled when absent.
    pub bearer: Option<BearerSection>,

    /// Username and password provider. Disabled when absent.
    pub basic: Option<BasicSection>,

    /// Ticket provider.
    pub ticket: TicketSection,
}

/// Bearer token settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BearerSection {
    /// Expected `iss` claim, also stamped on issued tokens.
    pub issuer: String,

    /// HMAC-SHA256 key. Prefer setting it through the environment.
    pub secret: String,

    /// Lifetime of issued tokens, in seconds.
    pub access_ttl_secs: u64,

    /// Lifetime of refresh tokens, in seconds.
    pub refresh_ttl_secs: u64,

    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
}

impl std::fmt::Debug for BearerSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerSection")
            .field("issuer", &self.issuer)
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl Default for BearerSection {
    fn default() -> Self {
        Self {
            issuer: "hermes".to_string(),
            secret: String::new(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 0,
        }
    }
}

/// Basic auth settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BasicSection {
    /// Realm announced in the `WWW-Authenticate` challenge.
    pub realm: String,

    /// Accounts loaded into the in-memory credential store.
    pub users: Vec<BasicUser>,
}

impl Default for BasicSection {
    fn default() -> Self {
        Self {
            realm: "hermes".to_string(),
            users: Vec::new(),
        }
    }
}

/// One basic auth account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BasicUser {
    /// Login name, also the request principal.
    pub username: String,

    /// Password. Hashed as soon as the store is built.
    pub password: String,

    /// Scopes granted to the account.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for BasicUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Ticket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TicketSection {
    /// Register the ticket provider.
    pub enabled: bool,

    /// Ticket lifetime, in seconds.
    pub ttl_secs: u64,
}

impl Default for TicketSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: hermes_auth::DEFAULT_TICKET_TTL.as_secs(),
        }
    }
}

/// CORS settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CorsSection {
    /// Apply CORS handling at all.
    pub enabled: bool,

    /// Allowed origins; `*` allows any.
    pub allowed_origins: Vec<String>,

    /// Allowed methods.
    pub allowed_methods: Vec<String>,

    /// Allowed request headers.
    pub allowed_headers: Vec<String>,

    /// Response headers exposed to scripts.
    pub exposed_headers: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,

    /// Preflight cache lifetime, in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsSection {
    fn default() -> Self {
        let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| (*s).to_string()).collect() };
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: strings(&["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH"]),
            allowed_headers: strings(&["content-type", "authorization", "x-request-id", "x-ticket"]),
            exposed_headers: strings(&["x-request-id"]),
            allow_credentials: false,
            max_age_secs: 86_400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_match_transport() {
        let section = ServerSection::default();
        assert_eq!(section.http_addr, "0.0.0.0:8080");
        assert_eq!(section.max_content_length, 5 * 1024 * 1024);
        assert_eq!(section.proxy_protocol, ProxyProtocolMode::Disabled);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let section: ServerSection = toml::from_str("max_in_flight = 64").unwrap();
        assert_eq!(section.max_in_flight, Some(64));
        assert_eq!(section.idle_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = toml::from_str::<ServerSection>("http2_enabled = true").unwrap_err();
        assert!(err.to_string().contains("http2_enabled"));
    }

    #[test]
    fn test_secret_redacted() {
        let bearer = BearerSection {
            secret: "super-secret-value".to_string(),
            ..Default::default()
        };
        assert!(!format!("{bearer:?}").contains("super-secret-value"));
    }

    #[test]
    fn test_basic_users_parse_and_redact() {
        let section: AuthSection = toml::from_str(
            r#"
            [basic]
            realm = "ops"

            [[basic.users]]
            username = "operator"
            password = "hunter22"
            scopes = ["nodes:read"]
            "#,
        )
        .unwrap();
        let basic = section.basic.unwrap();
        assert_eq!(basic.realm, "ops");
        assert_eq!(basic.users[0].scopes, vec!["nodes:read"]);
        assert!(!format!("{basic:?}").contains("hunter22"));
    }

    #[test]
    fn test_ticket_default_ttl() {
        assert_eq!(TicketSection::default().ttl_secs, 30);
    }
}

//! Typed, layered configuration for Hermes.
//!
//! [`HermesConfig`] holds everything a service needs at startup: the
//! transport ([`ServerSection`]), auth providers ([`AuthSection`]), CORS
//! ([`CorsSection`]) and logging. [`ConfigLoader`] builds it from layers:
//! defaults or a preset, then TOML/JSON files, then environment variables.
//! Unknown keys are errors.
//!
//! # Example
//!
//! ```no_run
//! use hermes_config::ConfigLoader;
//!
//! # fn main() -> Result<(), hermes_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("hermes.toml")?
//!     .with_env_prefix("HERMES")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! idle_timeout_secs = 30
//! max_in_flight = 1024
//! max_content_length = 5242880
//! proxy_protocol = "auto"
//! trusted_proxies = ["10.0.0.0/8"]
//!
//! [auth.bearer]
//! issuer = "nodes-api"
//! access_ttl_secs = 900
//! refresh_ttl_secs = 604800
//!
//! [auth.basic]
//! realm = "nodes-api"
//!
//! [[auth.basic.users]]
//! username = "operator"
//! password = "correct horse"
//! scopes = ["nodes:read"]
//!
//! [auth.ticket]
//! ttl_secs = 30
//!
//! [cors]
//! enabled = true
//! allowed_origins = ["https://console.example.com"]
//!
//! [logging]
//! level = "info,hermes=debug"
//! format = "json"
//! ```
//!
//! # Environment overrides
//!
//! `PREFIX__SECTION__KEY`, with one segment per nesting level:
//!
//! - `HERMES__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `HERMES__SERVER__TRUSTED_PROXIES=10.0.0.0/8,192.168.1.1`
//! - `HERMES__AUTH__BEARER__SECRET=...`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::HermesConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{AuthSection, BasicSection, BasicUser, BearerSection, CorsSection, ServerSection, TicketSection};

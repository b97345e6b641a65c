//! # Hermes Server
//!
//! HTTP/1.1 transport for the Hermes pipeline, built on hyper and Tokio.
//!
//! - HAProxy PROXY protocol v1 and v2, required or auto-detected
//! - `X-Forwarded-*` honoured from trusted proxies only
//! - Body size limit: 413 with `Connection: close`
//! - In-flight limit: 503 problem documents
//! - Idle connections closed gracefully
//! - Graceful shutdown with a drain deadline
//!
//! ## Example
//!
//! ```rust,no_run
//! use hermes_pipeline::PipelineBuilder;
//! use hermes_server::{ProxyProtocolMode, Server, ServerConfig, ShutdownSignal};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = PipelineBuilder::new().build()?;
//! let config = ServerConfig::builder()
//!     .http_addr("0.0.0.0:8080")
//!     .proxy_protocol(ProxyProtocolMode::Auto)
//!     .build();
//!
//! let shutdown = ShutdownSignal::with_os_signals();
//! Server::new(config, pipeline).run_with_shutdown(shutdown).await?;
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod forwarded;
pub mod proxy;
pub mod server;
pub mod shutdown;

pub use config::{ProxyProtocolMode, ServerConfig, ServerConfigBuilder};
pub use error::{ServerError, ServerResult};
pub use forwarded::{InvalidTrustedProxy, TrustedProxy};
pub use proxy::{ProxyError, ProxyHeader, ProxyVersion, Rewind};
pub use server::{HttpResponse, Server};
pub use shutdown::{ConnectionTracker, ShutdownSignal};

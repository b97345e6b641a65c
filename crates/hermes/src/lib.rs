//! # Hermes
//!
//! A modular REST request pipeline: a conflict-checked trie router,
//! pluggable codecs and auth providers, declarative validation and an
//! HAProxy-aware HTTP/1.1 transport.
//!
//! ## Quick start
//!
//! ```no_run
//! use hermes::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hermes::BootstrapError> {
//!     let app = Hermes::load(Some("hermes.toml"))?;
//!     app.init_logging()?;
//!
//!     let mut builder = app.pipeline_builder()?;
//!     builder.register(
//!         Route::get("/nodes/{id}", handler_fn(|request| {
//!             Box::pin(async move {
//!                 let id = request.path_param("id").unwrap_or_default().to_string();
//!                 Ok::<_, PipelineError>(Response::ok(json!({ "id": id })))
//!             })
//!         }))
//!         .providers(["bearer"])
//!         .scopes(["nodes:read"]),
//!     )?;
//!
//!     app.serve(builder.build()?, ShutdownSignal::with_os_signals()).await
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! accept → PROXY header → HTTP/1.1 → Received → Decoded → Routed
//!        → Authenticated → Validated → Handled → Encoded → Sent
//! ```
//!
//! A failure at any stage short-circuits to an `application/problem+json`
//! response carrying the request id.

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bootstrap;

pub use bootstrap::{cors_policy, server_config, BootstrapError, Hermes, Providers};

pub use hermes_auth as auth;
pub use hermes_codec as codec;
pub use hermes_config as config;
pub use hermes_core as core;
pub use hermes_pipeline as pipeline;
pub use hermes_router as router;
pub use hermes_server as server;
pub use hermes_telemetry as telemetry;
pub use hermes_validation as validation;

/// Common imports.
///
/// ```
/// use hermes::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{BootstrapError, Hermes};

    pub use hermes_auth::{AuthProvider, BasicAuthProvider, BearerTokenProvider, CredentialStore, TicketStore, TokenPair};
    pub use hermes_config::{ConfigLoader, HermesConfig};
    pub use hermes_core::{HandlerError, Identity, PipelineError, Request, Response};
    pub use hermes_pipeline::{handler_fn, CorsPolicy, Module, Pipeline, PipelineBuilder, Route, Stage};
    pub use hermes_server::{Server, ServerConfig, ShutdownSignal};
    pub use hermes_validation::{ConstraintSet, Field, FieldType, ValidPayload};
}

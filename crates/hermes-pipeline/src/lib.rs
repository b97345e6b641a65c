//! # Hermes Pipeline
//!
//! The staged request pipeline at the heart of Hermes.
//!
//! ## Stages
//!
//! ```text
//! RECEIVED → DECODED → ROUTED → AUTHENTICATED → VALIDATED → HANDLED → ENCODED → SENT
//! ```
//!
//! | Stage | Work | Fails with |
//! |-------|------|------------|
//! | Decoded | CORS preflight, `Accept` negotiation | 403, 406 |
//! | Routed | Trie lookup, path parameters bound | 404 |
//! | Authenticated | Route providers in order, scope check | 401, 403 |
//! | Validated | Constraint set on body, path and query | 400, 413, 415 |
//! | Handled | Pre-interceptors, handler, post-interceptors | handler's status |
//! | Encoded | Negotiated codec, problem documents for errors | 500 |
//!
//! `Sent` belongs to the transport, which calls [`Outcome::mark_sent`].
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use hermes_core::{Request, Response};
//! use hermes_pipeline::{handler_fn, PipelineBuilder, Route, Stage};
//! use http::StatusCode;
//! use http_body_util::Empty;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut builder = PipelineBuilder::new();
//! builder
//!     .register(Route::get("/healthz", handler_fn(|_request| {
//!         Box::pin(async { Ok::<_, hermes_core::PipelineError>(Response::ok(json!({"ok": true}))) })
//!     })).public())
//!     .unwrap();
//! let pipeline = builder.build().unwrap();
//!
//! let http = http::Request::get("/healthz").body(Empty::<Bytes>::new()).unwrap();
//! let outcome = pipeline.execute(Request::from_http(http, 1024)).await;
//! assert_eq!(outcome.status(), StatusCode::OK);
//! assert!(outcome.reached(Stage::Encoded));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod cors;
pub mod handler;
pub mod pipeline;
pub mod request_id;
pub mod route;
pub mod stage;

pub use builder::{BuildError, PipelineBuilder};
pub use cors::{AllowedOrigins, CorsPolicy};
pub use handler::{handler_fn, BoxFuture, FnHandler, Handler, Interceptor, SharedHandler, SharedInterceptor};
pub use pipeline::Pipeline;
pub use request_id::{RequestIdPolicy, REQUEST_ID_HEADER};
pub use route::{AuthPolicy, Module, Route};
pub use stage::{Failure, Flow, Outcome, Stage};

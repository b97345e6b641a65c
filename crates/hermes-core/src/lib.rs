//! # Hermes Core
//!
//! Foundational types shared by every Hermes crate:
//!
//! - [`Request`] - method, path, params, headers, lazily decoded body and an attribute bag
//! - [`Response`] - status, headers and a body producer taken at most once
//! - [`Identity`] - the authenticated principal with its scopes
//! - [`PipelineError`] / [`ErrorKind`] - the per-request error taxonomy
//! - [`Problem`] - RFC 7807 error document
//! - [`RequestId`] - UUID v7 request identifier

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod body;
mod context;
mod error;
mod identity;
mod request;
mod response;

pub use body::{BoxBody, BoxError, RequestBody};
pub use context::{ConnectionInfo, RequestId};
pub use error::{ErrorKind, HandlerError, PipelineError, PipelineResult, Problem, Violation};
pub use identity::Identity;
pub use request::{QueryParams, Request, RequestStateError, DEFAULT_BODY_LIMIT};
pub use response::{Response, ResponseBody};

pub use hermes_router::Params;

//! Handlers and interceptors: the business end of a route.
//!
//! A route's chain is `pre-interceptors → handler → post-interceptors`.
//! Pre-interceptors may answer the request themselves, which skips the
//! handler and the post-interceptors.
//!
//! # Example
//!
//! ```
//! use hermes_core::{HandlerError, PipelineError, Response};
//! use hermes_pipeline::handler_fn;
//! use serde_json::json;
//!
//! let show = handler_fn(|request| {
//!     Box::pin(async move {
//!         let id = request.path_param("id").unwrap_or_default().to_string();
//!         if id == "0" {
//!             return Err(PipelineError::from(HandlerError::not_found("node 0 does not exist")));
//!         }
//!         Ok(Response::ok(json!({ "id": id })))
//!     })
//! });
//! # let _ = show;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use hermes_core::{PipelineResult, Request, Response};

use crate::stage::Flow;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal request handler.
///
/// Return [`HandlerError`](hermes_core::HandlerError) (via `?` or `.into()`)
/// for business failures; it carries the status to answer with.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Produces the response.
    async fn handle(&self, request: &mut Request) -> PipelineResult<Response>;
}

/// Shared handler.
pub type SharedHandler = Arc<dyn Handler>;

/// A handler made from a closure returning a boxed future.
pub struct FnHandler<F> {
    func: F,
}

impl<F> std::fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Wraps a closure as a [`Handler`].
pub fn handler_fn<F>(func: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, PipelineResult<Response>> + Send + Sync + 'static,
{
    FnHandler { func }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Request) -> BoxFuture<'a, PipelineResult<Response>> + Send + Sync + 'static,
{
    async fn handle(&self, request: &mut Request) -> PipelineResult<Response> {
        (self.func)(request).await
    }
}

/// Code that runs around a route's handler.
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Runs before the handler. [`Flow::Respond`] skips the handler.
    async fn before(&self, _request: &mut Request) -> PipelineResult<Flow<()>> {
        Ok(Flow::Continue(()))
    }

    /// Runs on the handler's successful response.
    async fn after(&self, _request: &Request, _response: &mut Response) -> PipelineResult<()> {
        Ok(())
    }
}

/// Shared interceptor.
pub type SharedInterceptor = Arc<dyn Interceptor>;

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Empty;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_handler_sees_request() {
        let handler = handler_fn(|request| {
            Box::pin(async move {
                Ok::<_, hermes_core::PipelineError>(Response::ok(json!({ "path": request.path() })))
            })
        });
        let mut request = Request::from_http(
            http::Request::builder()
                .uri("/nodes")
                .body(Empty::<Bytes>::new())
                .unwrap(),
            0,
        );
        let response = handler.handle(&mut request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.structured_body(), Some(&json!({ "path": "/nodes" })));
    }

    #[tokio::test]
    async fn test_anyhow_errors_become_500() {
        let handler = handler_fn(|_request| {
            Box::pin(async move {
                let probe: anyhow::Result<()> = Err(anyhow::anyhow!("disk on fire"));
                probe?;
                Ok::<_, hermes_core::PipelineError>(Response::no_content())
            })
        });
        let mut request = Request::from_http(
            http::Request::builder().uri("/").body(Empty::<Bytes>::new()).unwrap(),
            0,
        );
        let err = handler.handle(&mut request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

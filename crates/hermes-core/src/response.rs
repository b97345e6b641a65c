//! The response model.
//!
//! Handlers usually return a [`ResponseBody::Structured`] value and leave
//! encoding to the pipeline, which picks the codec negotiated from
//! `Accept`. Raw bytes and streams bypass the codec.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::Value;

use crate::body::{BoxBody, BoxError};
use crate::error::{PipelineError, Problem};
use crate::request::Request;

/// The body producer of a response.
pub enum ResponseBody {
    /// No body.
    Empty,
    /// A value to encode with the negotiated codec.
    Structured(Value),
    /// Pre-encoded bytes.
    Bytes {
        /// Payload.
        data: Bytes,
        /// Content type to send, if any.
        content_type: Option<HeaderValue>,
    },
    /// A streaming body.
    Stream {
        /// Body stream.
        body: BoxBody,
        /// Content type to send, if any.
        content_type: Option<HeaderValue>,
    },
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Structured(v) => f.debug_tuple("Structured").field(v).finish(),
            Self::Bytes { data, content_type } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            Self::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish(),
        }
    }
}

/// An outbound response.
///
/// The body is only reachable through [`Response::into_parts`], which
/// consumes the response, so it is produced at most once.
///
/// # Example
///
/// ```
/// use hermes_core::{Response, ResponseBody};
/// use http::StatusCode;
/// use serde_json::json;
///
/// let response = Response::ok(json!({"id": 42})).with_header("x-node", "n1");
/// assert_eq!(response.status(), StatusCode::OK);
///
/// let (_, headers, body) = response.into_parts();
/// assert_eq!(headers["x-node"], "n1");
/// assert!(matches!(body, ResponseBody::Structured(_)));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    problem: bool,
}

impl Response {
    /// An empty response with `status`.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::Empty,
            problem: false,
        }
    }

    /// A structured response.
    #[must_use]
    pub fn structured(status: StatusCode, value: Value) -> Self {
        Self {
            body: ResponseBody::Structured(value),
            ..Self::new(status)
        }
    }

    /// Serializes `value` into a structured response.
    pub fn serialize<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, PipelineError> {
        serde_json::to_value(value)
            .map(|v| Self::structured(status, v))
            .map_err(|e| PipelineError::internal(format!("response serialization failed: {e}")))
    }

    /// 200 with a structured body.
    #[must_use]
    pub fn ok(value: Value) -> Self {
        Self::structured(StatusCode::OK, value)
    }

    /// 201 with a structured body.
    #[must_use]
    pub fn created(value: Value) -> Self {
        Self::structured(StatusCode::CREATED, value)
    }

    /// 204.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// Pre-encoded bytes with a content type.
    #[must_use]
    pub fn bytes(status: StatusCode, content_type: HeaderValue, data: impl Into<Bytes>) -> Self {
        Self {
            body: ResponseBody::Bytes {
                data: data.into(),
                content_type: Some(content_type),
            },
            ..Self::new(status)
        }
    }

    /// A streaming body.
    pub fn stream<B>(status: StatusCode, content_type: HeaderValue, body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            body: ResponseBody::Stream {
                body: body.map_err(Into::into).boxed_unsync(),
                content_type: Some(content_type),
            },
            ..Self::new(status)
        }
    }

    /// The error response for `error`: a problem document plus the
    /// headers the error kind calls for.
    #[must_use]
    pub fn from_error(error: &PipelineError, instance: Option<&str>) -> Self {
        let problem = error.to_problem(instance);
        Self::from_problem(error, problem)
    }

    /// The error response for `error` on `request`: the problem document
    /// names the request path and request id.
    #[must_use]
    pub fn from_request_error(error: &PipelineError, request: &Request) -> Self {
        let mut problem = error.to_problem(Some(request.path()));
        problem.request_id = Some(request.request_id().to_string());
        Self::from_problem(error, problem)
    }

    fn from_problem(error: &PipelineError, problem: Problem) -> Self {
        let value = serde_json::to_value(&problem).unwrap_or(Value::Null);
        let mut response = Self::structured(error.status(), value);
        response.problem = true;

        match error {
            PipelineError::Unauthenticated {
                challenge: Some(challenge),
                ..
            } => {
                if let Ok(value) = HeaderValue::from_str(challenge) {
                    response.headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            PipelineError::PayloadTooLarge { .. } => {
                response
                    .headers
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }
        response
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Replaces the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Read-only view of a structured body.
    #[must_use]
    pub fn structured_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Structured(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true for error responses carrying a problem document.
    #[must_use]
    pub fn is_problem(&self) -> bool {
        self.problem
    }

    /// Splits the response, handing out the body producer.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Reassembles a response from parts.
    #[must_use]
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
            problem: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use serde_json::json;

    #[test]
    fn test_error_response_carries_problem() {
        let err = PipelineError::from(HandlerError::not_found("node 42 does not exist"));
        let response = Response::from_error(&err, Some("/nodes/42"));

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.is_problem());
        let body = response.structured_body().unwrap();
        assert_eq!(body["kind"], "handler_error");
        assert_eq!(body["detail"], "node 42 does not exist");
        assert_eq!(body["instance"], "/nodes/42");
    }

    #[test]
    fn test_request_error_names_request() {
        let request = Request::from_http(
            http::Request::builder()
                .uri("/nodes/7?verbose=true")
                .body(http_body_util::Empty::<Bytes>::new())
                .unwrap(),
            0,
        );
        let err = PipelineError::forbidden("missing scope nodes:write");
        let response = Response::from_request_error(&err, &request);
        let body = response.structured_body().unwrap();
        assert_eq!(body["instance"], "/nodes/7");
        assert_eq!(body["requestId"], request.request_id().to_string());
    }

    #[test]
    fn test_unauthenticated_sets_challenge() {
        let err = PipelineError::Unauthenticated {
            reason: "token expired".into(),
            challenge: Some("Bearer error=\"invalid_token\"".into()),
        };
        let response = Response::from_error(&err, None);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Bearer error=\"invalid_token\""
        );
    }

    #[test]
    fn test_payload_too_large_closes() {
        let err = PipelineError::PayloadTooLarge { limit: 10 };
        let response = Response::from_error(&err, None);
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }

    #[test]
    fn test_serialize() {
        #[derive(Serialize)]
        struct Node {
            id: u32,
        }
        let response = Response::serialize(StatusCode::CREATED, &Node { id: 7 }).unwrap();
        assert_eq!(response.structured_body(), Some(&json!({"id": 7})));
    }
}

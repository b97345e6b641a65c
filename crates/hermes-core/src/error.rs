//! Error types for Hermes.
//!
//! Every per-request failure is a [`PipelineError`]. The executor turns it
//! into a response whose body is a [`Problem`] document (RFC 7807) carrying a
//! machine-readable [`ErrorKind`] and a human-readable message.
//!
//! | `ErrorKind` | Status |
//! |---|---|
//! | `NoMatch` | 404 |
//! | `NotAcceptable` | 406 |
//! | `UnsupportedMediaType` | 415 |
//! | `MalformedBody` | 400 |
//! | `PayloadTooLarge` | 413 |
//! | `Unauthenticated` | 401 |
//! | `Forbidden` | 403 |
//! | `ValidationFailed` | 400 |
//! | `HandlerError` | declared by the handler, 500 otherwise |
//! | `ServiceUnavailable` | 503 |
//! | `Internal` | 500 |
//!
//! `RouteConflict` and `TransportWriteFailed` never reach a client: the
//! first aborts startup, the second closes the connection.

use hermes_codec::CodecError;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Two routes overlap (startup only).
    RouteConflict,
    /// No route for the method and path.
    NoMatch,
    /// No registered codec satisfies `Accept`.
    NotAcceptable,
    /// No registered codec handles `Content-Type`.
    UnsupportedMediaType,
    /// The body could not be parsed.
    MalformedBody,
    /// The body exceeds the configured limit.
    PayloadTooLarge,
    /// No provider accepted the request's credentials.
    Unauthenticated,
    /// The identity lacks a required scope.
    Forbidden,
    /// One or more constraints were violated.
    ValidationFailed,
    /// The handler failed.
    HandlerError,
    /// The server is at capacity.
    ServiceUnavailable,
    /// Unexpected failure inside the pipeline.
    Internal,
    /// Writing the response failed (connection level).
    TransportWriteFailed,
}

impl ErrorKind {
    /// Returns the default HTTP status for this kind.
    #[must_use]
    pub const fn default_status(&self) -> StatusCode {
        match self {
            Self::NoMatch => StatusCode::NOT_FOUND,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MalformedBody | Self::ValidationFailed => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RouteConflict => StatusCode::CONFLICT,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::HandlerError | Self::Internal | Self::TransportWriteFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the snake_case name used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RouteConflict => "route_conflict",
            Self::NoMatch => "no_match",
            Self::NotAcceptable => "not_acceptable",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::MalformedBody => "malformed_body",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::ValidationFailed => "validation_failed",
            Self::HandlerError => "handler_error",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Internal => "internal",
            Self::TransportWriteFailed => "transport_write_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Field path (`name`, `spec.replicas`, `path.id`, `query.limit`).
    pub field: String,
    /// Constraint name (`required`, `type`, `range`, ...).
    pub constraint: String,
    /// Human-readable explanation.
    pub message: String,
}

impl Violation {
    /// Creates a violation.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        constraint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
            message: message.into(),
        }
    }
}

/// Failure reported by business logic.
///
/// Maps to 500 unless the handler declares a status.
///
/// # Example
///
/// ```
/// use hermes_core::HandlerError;
/// use http::StatusCode;
///
/// let err = HandlerError::not_found("node 42 does not exist");
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
///
/// let err: HandlerError = anyhow::anyhow!("disk on fire").into();
/// assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
/// ```
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    status: StatusCode,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl HandlerError {
    /// Creates a 500 handler error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Creates a handler error with a declared status.
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
        }
    }

    /// 404 with a message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, message)
    }

    /// 409 with a message.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, message)
    }

    /// 400 with a message.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, message)
    }

    /// The status to answer with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The message shown to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(source: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "handler failed".to_string(),
            source: Some(source),
        }
    }
}

/// A per-request failure, converted to a response by the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No route for the method and path.
    #[error("no route for {method} {path}")]
    NoMatch {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// Negotiation, decoding or encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The request body could not be read.
    #[error("failed to read request body: {reason}")]
    BodyRead {
        /// Transport message.
        reason: String,
    },

    /// The request body exceeds the limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// No provider accepted the credentials.
    #[error("authentication required: {reason}")]
    Unauthenticated {
        /// Why the last attempt failed.
        reason: String,
        /// `WWW-Authenticate` challenge to send back.
        challenge: Option<String>,
    },

    /// The identity lacks a required scope.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Which scope was missing.
        reason: String,
    },

    /// Constraint violations.
    #[error("validation failed with {} violation(s)", .violations.len())]
    ValidationFailed {
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// The handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The server is at capacity.
    #[error("service unavailable: {reason}")]
    ServiceUnavailable {
        /// Which limit was hit.
        reason: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description for logs.
        message: String,
    },
}

impl PipelineError {
    /// Creates an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
            challenge: None,
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatch { .. } => ErrorKind::NoMatch,
            Self::Codec(codec) => match codec {
                CodecError::NotAcceptable { .. } | CodecError::Unrepresentable { .. } => {
                    ErrorKind::NotAcceptable
                }
                CodecError::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
                CodecError::MalformedBody { .. } => ErrorKind::MalformedBody,
                CodecError::Encode { .. }
                | CodecError::MissingCodec
                | CodecError::UnknownDefault { .. } => ErrorKind::Internal,
            },
            Self::BodyRead { .. } => ErrorKind::MalformedBody,
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::Handler(_) => ErrorKind::HandlerError,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// HTTP status for the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Handler(err) => err.status(),
            other => other.kind().default_status(),
        }
    }

    /// Message shown to the client. Internal details stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal server error".to_string(),
            Self::Codec(CodecError::Encode { .. }) => "response could not be encoded".to_string(),
            Self::Handler(err) => err.message().to_string(),
            other => other.to_string(),
        }
    }

    /// Violations, for validation failures.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::ValidationFailed { violations } => violations,
            _ => &[],
        }
    }

    /// Builds the problem document for this error.
    #[must_use]
    pub fn to_problem(&self, instance: Option<&str>) -> Problem {
        let status = self.status();
        Problem {
            type_uri: "about:blank".to_string(),
            title: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            status: status.as_u16(),
            detail: self.public_message(),
            instance: instance.map(str::to_string),
            kind: self.kind(),
            request_id: None,
            violations: self.violations().to_vec(),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(source: anyhow::Error) -> Self {
        Self::Handler(source.into())
    }
}

/// Problem details document (RFC 7807) sent for every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    /// Problem type URI.
    #[serde(rename = "type")]
    pub type_uri: String,
    /// Short summary (the status reason phrase).
    pub title: String,
    /// HTTP status.
    pub status: u16,
    /// Human-readable explanation.
    pub detail: String,
    /// Request path the problem occurred on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Machine-readable error kind.
    pub kind: ErrorKind,
    /// Request id, for correlation with server logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Field violations, for validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

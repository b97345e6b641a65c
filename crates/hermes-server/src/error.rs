//! Transport errors.

use std::net::SocketAddr;

use thiserror::Error;

use crate::proxy::ProxyError;

/// Errors raised by the transport.
///
/// Per-request failures never surface here; they become responses inside
/// the pipeline. These are listener and connection failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid listen address `{addr}`: {reason}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// Binding the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Accepting or reading a connection failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The proxy-protocol header was missing or malformed.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The HTTP connection failed, typically while writing a response.
    #[error("connection failed: {0}")]
    Connection(#[from] hyper::Error),
}

/// Result alias for transport operations.
pub type ServerResult<T> = Result<T, ServerError>;

//! Router errors.

use http::Method;
use thiserror::Error;

/// Two routes would resolve identically for some concrete path.
///
/// Raised at registration time, never at request time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("route conflict: {method} {pattern} overlaps already registered {method} {existing}")]
pub struct RouteConflict {
    /// Method of the rejected route.
    pub method: Method,
    /// Pattern of the rejected route.
    pub pattern: String,
    /// Pattern of the route that was registered first.
    pub existing: String,
}

/// Errors produced while building a router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The route overlaps an existing one.
    #[error(transparent)]
    Conflict(#[from] RouteConflict),

    /// The pattern string is malformed.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl RouterError {
    /// Returns the conflict, if this error is one.
    #[must_use]
    pub fn as_conflict(&self) -> Option<&RouteConflict> {
        match self {
            Self::Conflict(conflict) => Some(conflict),
            Self::InvalidPattern { .. } => None,
        }
    }
}

//! The per-request state machine.
//!
//! ```text
//! RECEIVED → DECODED → ROUTED → AUTHENTICATED → VALIDATED → HANDLED → ENCODED → SENT
//!     └──────────┴─────────┴──────────┴──────────────┴──────────┴─→ FAILED(stage, kind)
//! ```
//!
//! Any stage may end the request early with [`Flow::Respond`] or fail with a
//! [`PipelineError`](hermes_core::PipelineError). Either way the response is
//! still encoded, so every execution produces exactly one response.

use hermes_core::{BoxBody, ErrorKind, Response};
use http::StatusCode;

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Headers, path and query parsed by the transport.
    Received = 1,
    /// Response codec negotiated.
    Decoded = 2,
    /// Route matched and path parameters bound.
    Routed = 3,
    /// Identity attached, or the route is public.
    Authenticated = 4,
    /// Constraints checked, or the route has none.
    Validated = 5,
    /// Interceptors and handler produced a response.
    Handled = 6,
    /// Response body encoded.
    Encoded = 7,
    /// Response written by the transport.
    Sent = 8,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Routed => "routed",
            Self::Authenticated => "authenticated",
            Self::Validated => "validated",
            Self::Handled => "handled",
            Self::Encoded => "encoded",
            Self::Sent => "sent",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 8] {
        [
            Self::Received,
            Self::Decoded,
            Self::Routed,
            Self::Authenticated,
            Self::Validated,
            Self::Handled,
            Self::Encoded,
            Self::Sent,
        ]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a stage decided.
#[derive(Debug)]
pub enum Flow<T> {
    /// Go on to the next stage with `T`.
    Continue(T),
    /// Skip the remaining stages and encode this response.
    Respond(Response),
}

/// Where and why a request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The stage that failed.
    pub stage: Stage,
    /// What went wrong.
    pub kind: ErrorKind,
}

/// The result of one pipeline execution.
#[derive(Debug)]
pub struct Outcome {
    /// The encoded response, ready for the transport.
    pub response: http::Response<BoxBody>,
    /// Stages the request passed through, in order.
    pub stages: Vec<Stage>,
    /// Set when a stage failed.
    pub failure: Option<Failure>,
    /// Pattern of the matched route.
    pub route: Option<String>,
}

impl Outcome {
    /// Response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Returns true if the request passed through `stage`.
    #[must_use]
    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Records that the transport wrote the response.
    pub fn mark_sent(&mut self) {
        self.stages.push(Stage::Sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        let stages = Stage::all();
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stages[0].name(), "received");
        assert_eq!(stages[7].name(), "sent");
    }

    #[test]
    fn test_display() {
        assert_eq!(Stage::Authenticated.to_string(), "authenticated");
    }
}

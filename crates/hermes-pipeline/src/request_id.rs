//! Request id assignment.
//!
//! Every request gets a UUID v7 id, echoed in the `x-request-id` response
//! header and in problem documents. Ids sent by the client are only kept
//! when the pipeline trusts its callers, typically behind an internal
//! gateway that already assigned one.

use hermes_core::{Request, RequestId};
use http::HeaderValue;

/// Header carrying the request id both ways.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Decides which id a request runs under.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdPolicy {
    trust_incoming: bool,
}

impl RequestIdPolicy {
    /// Always generates a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps a well-formed incoming `x-request-id`.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    /// Returns true if incoming ids are kept.
    #[must_use]
    pub fn trusts_incoming(&self) -> bool {
        self.trust_incoming
    }

    /// Sets the request id on `request` and returns it.
    pub fn assign(&self, request: &mut Request) -> RequestId {
        let incoming = if self.trust_incoming {
            request.header(REQUEST_ID_HEADER).and_then(RequestId::parse)
        } else {
            None
        };
        match incoming {
            Some(id) => {
                request.set_request_id(id);
                id
            }
            None => request.request_id(),
        }
    }

    /// Header value for `id`.
    #[must_use]
    pub fn header_value(id: RequestId) -> Option<HeaderValue> {
        HeaderValue::from_str(&id.to_string()).ok()
    }
}

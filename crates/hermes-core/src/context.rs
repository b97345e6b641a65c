//! Per-request metadata: request ids and connection info.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps ids sortable in logs.
///
/// # Example
///
/// ```
/// use hermes_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(RequestId::parse(&id.to_string()), Some(id));
/// assert_eq!(RequestId::parse("not-a-uuid"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses an id propagated by a client or upstream proxy.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Where a request came from.
///
/// `peer_addr` is the socket peer. `client_addr` is the real client once a
/// proxy-protocol header or trusted forwarding headers have been applied;
/// otherwise it equals `peer_addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Address of the directly connected peer.
    pub peer_addr: Option<SocketAddr>,
    /// Address of the originating client.
    pub client_addr: Option<SocketAddr>,
    /// `http` or `https` as seen by the client.
    pub scheme: String,
    /// Host the client addressed, if known.
    pub host: Option<String>,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            peer_addr: None,
            client_addr: None,
            scheme: "http".to_string(),
            host: None,
        }
    }
}

impl ConnectionInfo {
    /// Connection info for a direct peer.
    #[must_use]
    pub fn direct(peer: SocketAddr) -> Self {
        Self {
            peer_addr: Some(peer),
            client_addr: Some(peer),
            ..Self::default()
        }
    }
}

//! Authentication by one-time ticket.

use async_trait::async_trait;
use hermes_core::{Identity, Request};

use crate::error::AuthFailure;
use crate::provider::{AuthOutcome, AuthProvider};
use crate::store::{Redemption, TicketStore};

/// Header carrying a ticket id.
pub const TICKET_HEADER: &str = "x-ticket";

/// Query parameter carrying a ticket id, for clients that cannot set
/// headers (browsers opening sockets or downloads).
pub const TICKET_QUERY: &str = "ticket";

/// Redeems a ticket presented in `x-ticket` or `?ticket=`.
///
/// A successful authentication consumes the ticket.
#[derive(Debug)]
pub struct TicketProvider<S> {
    store: S,
}

impl<S: TicketStore> TicketProvider<S> {
    /// Provider name used in route policies.
    pub const NAME: &'static str = "ticket";

    /// Creates a provider redeeming against `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

fn ticket_id(request: &Request) -> Option<&str> {
    request
        .header(TICKET_HEADER)
        .or_else(|| request.query().first(TICKET_QUERY))
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[async_trait]
impl<S: TicketStore> AuthProvider for TicketProvider<S> {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn authenticate(&self, request: &Request) -> AuthOutcome {
        let Some(id) = ticket_id(request) else {
            return AuthOutcome::Absent;
        };
        match self.store.redeem(id).await {
            Ok(Redemption::Redeemed(ticket)) => AuthOutcome::Authenticated(
                Identity::new(ticket.principal, Self::NAME)
                    .with_scopes(ticket.scopes)
                    .with_expiry(ticket.expires_at),
            ),
            Ok(Redemption::Unknown) => AuthOutcome::Rejected(AuthFailure::UnknownTicket),
            Ok(Redemption::Expired) => AuthOutcome::Rejected(AuthFailure::TicketExpired),
            Ok(Redemption::AlreadyConsumed) => AuthOutcome::Rejected(AuthFailure::TicketConsumed),
            Err(failure) => {
                tracing::warn!(%failure, "ticket store failed");
                AuthOutcome::Rejected(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTicketStore;
    use bytes::Bytes;
    use http_body_util::Empty;
    use std::sync::Arc;

    fn request(uri: &str, header: Option<&str>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(id) = header {
            builder = builder.header(TICKET_HEADER, id);
        }
        Request::from_http(builder.body(Empty::<Bytes>::new()).unwrap(), 0)
    }

    #[tokio::test]
    async fn test_header_ticket_consumed() {
        let store = Arc::new(MemoryTicketStore::default());
        let provider = TicketProvider::new(Arc::clone(&store));
        let ticket = store.issue("alice", &["logs:tail".to_string()]).await.unwrap();

        let outcome = provider.authenticate(&request("/logs", Some(&ticket.id))).await;
        let AuthOutcome::Authenticated(identity) = outcome else {
            panic!("expected identity, got {outcome:?}");
        };
        assert_eq!(identity.principal(), "alice");
        assert_eq!(identity.provider(), "ticket");
        assert!(identity.has_scope("logs:tail"));

        assert_eq!(
            provider.authenticate(&request("/logs", Some(&ticket.id))).await,
            AuthOutcome::Rejected(AuthFailure::TicketConsumed)
        );
    }

    #[tokio::test]
    async fn test_query_ticket() {
        let store = Arc::new(MemoryTicketStore::default());
        let provider = TicketProvider::new(Arc::clone(&store));
        let ticket = store.issue("bob", &[]).await.unwrap();

        let uri = format!("/logs?follow=true&ticket={}", ticket.id);
        assert!(matches!(
            provider.authenticate(&request(&uri, None)).await,
            AuthOutcome::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn test_absent_and_unknown() {
        let provider = TicketProvider::new(MemoryTicketStore::default());
        assert_eq!(provider.authenticate(&request("/logs", None)).await, AuthOutcome::Absent);
        assert_eq!(
            provider.authenticate(&request("/logs", Some("deadbeef"))).await,
            AuthOutcome::Rejected(AuthFailure::UnknownTicket)
        );
    }
}

//! One-time ticket storage.
//!
//! A ticket is a short-lived credential that can be redeemed exactly once.
//! Redemption must check and invalidate atomically: of any number of
//! concurrent redeemers, exactly one wins.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthFailure;

/// Default ticket lifetime.
pub const DEFAULT_TICKET_TTL: std::time::Duration = std::time::Duration::from_secs(30);

/// A one-time credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque id presented by the client.
    pub id: String,
    /// Principal the ticket was issued to.
    pub principal: String,
    /// Scopes granted on redemption.
    pub scopes: Vec<String>,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// The ticket is invalid at and after this instant.
    pub expires_at: DateTime<Utc>,
}

/// Result of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// This caller consumed the ticket.
    Redeemed(Ticket),
    /// No such ticket.
    Unknown,
    /// The ticket outlived its TTL.
    Expired,
    /// Someone already redeemed it.
    AlreadyConsumed,
}

impl Redemption {
    /// Returns true if this caller won the ticket.
    #[must_use]
    pub fn is_redeemed(&self) -> bool {
        matches!(self, Self::Redeemed(_))
    }
}

/// Backend holding outstanding tickets.
///
/// Implementations must make [`TicketStore::redeem`] atomic across every
/// process sharing the store.
#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Issues a ticket for `principal`.
    async fn issue(&self, principal: &str, scopes: &[String]) -> Result<Ticket, AuthFailure>;

    /// Checks and consumes the ticket `id`.
    async fn redeem(&self, id: &str) -> Result<Redemption, AuthFailure>;
}

#[async_trait]
impl<T: TicketStore + ?Sized> TicketStore for Arc<T> {
    async fn issue(&self, principal: &str, scopes: &[String]) -> Result<Ticket, AuthFailure> {
        (**self).issue(principal, scopes).await
    }

    async fn redeem(&self, id: &str) -> Result<Redemption, AuthFailure> {
        (**self).redeem(id).await
    }
}

#[derive(Debug)]
struct Entry {
    ticket: Ticket,
    consumed: bool,
}

/// In-process ticket store.
///
/// Each entry sits behind its shard's write lock while it is checked and
/// marked consumed, which makes redemption atomic within the process.
#[derive(Debug)]
pub struct MemoryTicketStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self::new(DEFAULT_TICKET_TTL)
    }
}

impl MemoryTicketStore {
    /// Creates a store issuing tickets valid for `ttl`.
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(30)),
        }
    }

    /// Number of tickets held, consumed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no tickets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops consumed and expired tickets. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.consumed && now < entry.ticket.expires_at);
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn issue(&self, principal: &str, scopes: &[String]) -> Result<Ticket, AuthFailure> {
        let issued_at = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4().simple().to_string(),
            principal: principal.to_string(),
            scopes: scopes.to_vec(),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        self.entries.insert(
            ticket.id.clone(),
            Entry {
                ticket: ticket.clone(),
                consumed: false,
            },
        );
        tracing::debug!(principal, ticket_ttl = self.ttl.num_seconds(), "ticket issued");
        Ok(ticket)
    }

    async fn redeem(&self, id: &str) -> Result<Redemption, AuthFailure> {
        let Some(mut entry) = self.entries.get_mut(id) else {
            return Ok(Redemption::Unknown);
        };
        if entry.consumed {
            return Ok(Redemption::AlreadyConsumed);
        }
        if Utc::now() >= entry.ticket.expires_at {
            return Ok(Redemption::Expired);
        }
        entry.consumed = true;
        Ok(Redemption::Redeemed(entry.ticket.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn test_redeem_once() {
        let store = MemoryTicketStore::default();
        let ticket = store.issue("alice", &["ws".to_string()]).await.unwrap();
        assert_eq!(ticket.id.len(), 32);

        let first = store.redeem(&ticket.id).await.unwrap();
        assert_eq!(first, Redemption::Redeemed(ticket.clone()));
        assert_eq!(
            store.redeem(&ticket.id).await.unwrap(),
            Redemption::AlreadyConsumed
        );
    }

    #[tokio::test]
    async fn test_unknown_and_expired() {
        let store = MemoryTicketStore::new(std::time::Duration::ZERO);
        assert_eq!(store.redeem("nope").await.unwrap(), Redemption::Unknown);

        let ticket = store.issue("alice", &[]).await.unwrap();
        assert_eq!(store.redeem(&ticket.id).await.unwrap(), Redemption::Expired);
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redeem_has_one_winner() {
        const REDEEMERS: usize = 32;

        let store = Arc::new(MemoryTicketStore::default());
        let ticket = store.issue("alice", &[]).await.unwrap();
        let barrier = Arc::new(Barrier::new(REDEEMERS));

        let tasks: Vec<_> = (0..REDEEMERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                let id = ticket.id.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    store.redeem(&id).await.unwrap()
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Redemption::Redeemed(_) => winners += 1,
                Redemption::AlreadyConsumed => {}
                other => panic!("unexpected redemption {other:?}"),
            }
        }
        assert_eq!(winners, 1);
    }
}

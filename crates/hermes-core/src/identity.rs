//! Authenticated caller identity.
//!
//! An [`Identity`] is what a successful authentication step attaches to a
//! request. Its absence means the request is unauthenticated.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated principal and what it may do.
///
/// # Example
///
/// ```
/// use hermes_core::Identity;
///
/// let identity = Identity::new("node-agent", "bearer").with_scopes(["nodes:read"]);
/// assert!(identity.has_scope("nodes:read"));
/// assert!(identity.has_any_scope(&["nodes:write".to_string(), "nodes:read".to_string()]));
/// assert_eq!(identity.log_id(), "bearer:node-agent");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    principal: String,
    scopes: BTreeSet<String>,
    expires_at: Option<DateTime<Utc>>,
    provider: String,
}

impl Identity {
    /// Creates an identity with no scopes and no expiry.
    #[must_use]
    pub fn new(principal: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            scopes: BTreeSet::new(),
            expires_at: None,
            provider: provider.into(),
        }
    }

    /// Adds granted scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Sets when the credential behind this identity expires.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// The principal identifier (user, service or ticket owner).
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Granted scopes.
    #[must_use]
    pub fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }

    /// Credential expiry, if the provider knows it.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Name of the auth provider that produced this identity.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Returns true if `scope` was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Returns true if at least one of `required` was granted, or if
    /// `required` is empty.
    #[must_use]
    pub fn has_any_scope(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|s| self.scopes.contains(s))
    }

    /// Identifier for logs. Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("{}:{}", self.provider, self.principal)
    }
}

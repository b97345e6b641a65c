//! Username and password authentication.
//!
//! Clients send `Authorization: Basic base64(username:password)`. The
//! provider splits the credential at the first `:` and asks a
//! [`CredentialStore`] whether the pair is valid.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use dashmap::DashMap;
use hermes_core::{Identity, Request};
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AuthFailure;
use crate::provider::{AuthOutcome, AuthProvider};

type HmacSha256 = Hmac<Sha256>;

/// An account a [`CredentialStore`] vouched for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Principal attached to the request.
    pub username: String,
    /// Scopes granted to the account.
    pub scopes: Vec<String>,
}

/// Backend checking username and password pairs.
///
/// Implementations should take the same time whether the password is wrong
/// or the user does not exist.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the account when `password` is correct for `username`.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Account>, AuthFailure>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<S> {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Account>, AuthFailure> {
        (**self).verify(username, password).await
    }
}

struct StoredAccount {
    tag: Vec<u8>,
    scopes: Vec<String>,
}

/// In-process credential store.
///
/// Passwords are never kept. Each is stored as an HMAC-SHA256 tag under a
/// key generated when the store is created, and checked with a
/// constant-time tag comparison.
///
/// # Example
///
/// ```
/// use hermes_auth::MemoryCredentialStore;
///
/// let store = MemoryCredentialStore::new();
/// store.insert("operator", "correct horse", ["nodes:read"]).unwrap();
/// assert!(store.contains("operator"));
/// ```
pub struct MemoryCredentialStore {
    key: [u8; 32],
    accounts: DashMap<String, StoredAccount>,
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        key[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self {
            key,
            accounts: DashMap::new(),
        }
    }
}

impl MemoryCredentialStore {
    /// Creates an empty store with a fresh key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an account.
    pub fn insert<I, S>(&self, username: impl Into<String>, password: &str, scopes: I) -> Result<(), AuthFailure>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let account = StoredAccount {
            tag: self.mac()?.chain_update(password.as_bytes()).finalize().into_bytes().to_vec(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        };
        self.accounts.insert(username.into(), account);
        Ok(())
    }

    /// Removes an account. Returns true if it existed.
    pub fn remove(&self, username: &str) -> bool {
        self.accounts.remove(username).is_some()
    }

    /// Returns true if `username` has an account.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.accounts.contains_key(username)
    }

    fn mac(&self) -> Result<HmacSha256, AuthFailure> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| AuthFailure::Backend(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<Account>, AuthFailure> {
        let mac = self.mac()?.chain_update(password.as_bytes());
        let Some(account) = self.accounts.get(username) else {
            // Spend the same work on unknown users as on known ones.
            let _ = mac.finalize();
            return Ok(None);
        };
        if mac.verify_slice(&account.tag).is_err() {
            return Ok(None);
        }
        Ok(Some(Account {
            username: username.to_string(),
            scopes: account.scopes.clone(),
        }))
    }
}

/// What a `Basic` credential decoded to.
#[derive(Debug, PartialEq, Eq)]
enum BasicCredential {
    Pair { username: String, password: String },
    Malformed(&'static str),
}

/// Extracts the credential from an `Authorization: Basic` header.
///
/// The scheme is case-insensitive. Both the standard and the URL-safe
/// base64 alphabets are accepted.
fn basic_credential(request: &Request) -> Option<BasicCredential> {
    let value = request.header(AUTHORIZATION)?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let encoded = encoded.trim();
    let Ok(decoded) = STANDARD.decode(encoded).or_else(|_| URL_SAFE.decode(encoded)) else {
        return Some(BasicCredential::Malformed("credential is not base64"));
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return Some(BasicCredential::Malformed("credential is not UTF-8"));
    };
    let Some((username, password)) = decoded.split_once(':') else {
        return Some(BasicCredential::Malformed("credential lacks a ':' separator"));
    };
    if username.is_empty() {
        return Some(BasicCredential::Malformed("empty username"));
    }
    Some(BasicCredential::Pair {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Authenticates `Authorization: Basic` headers against a
/// [`CredentialStore`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use hermes_auth::{BasicAuthProvider, MemoryCredentialStore};
///
/// let store = Arc::new(MemoryCredentialStore::new());
/// store.insert("operator", "correct horse", ["nodes:read"]).unwrap();
/// let provider = BasicAuthProvider::new(store, "hermes");
/// assert_eq!(provider.realm(), "hermes");
/// ```
#[derive(Debug)]
pub struct BasicAuthProvider<S> {
    store: S,
    realm: String,
}

impl<S: CredentialStore> BasicAuthProvider<S> {
    /// Provider name used in route policies.
    pub const NAME: &'static str = "basic";

    /// Creates a provider checking against `store`.
    pub fn new(store: S, realm: impl Into<String>) -> Self {
        Self {
            store,
            realm: realm.into(),
        }
    }

    /// Realm announced in the challenge.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: CredentialStore> AuthProvider for BasicAuthProvider<S> {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn authenticate(&self, request: &Request) -> AuthOutcome {
        let (username, password) = match basic_credential(request) {
            None => return AuthOutcome::Absent,
            Some(BasicCredential::Malformed(reason)) => {
                return AuthOutcome::Rejected(AuthFailure::MalformedToken(reason.into()))
            }
            Some(BasicCredential::Pair { username, password }) => (username, password),
        };
        match self.store.verify(&username, &password).await {
            Ok(Some(account)) => AuthOutcome::Authenticated(
                Identity::new(account.username, Self::NAME).with_scopes(account.scopes),
            ),
            Ok(None) => AuthOutcome::Rejected(AuthFailure::InvalidCredentials),
            Err(failure) => {
                tracing::warn!(%failure, "credential store failed");
                AuthOutcome::Rejected(failure)
            }
        }
    }

    fn challenge(&self) -> Option<String> {
        Some(format!("Basic realm=\"{}\", charset=\"UTF-8\"", self.realm))
    }
}

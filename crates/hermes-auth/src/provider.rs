//! The authentication capability and the ordered provider registry.

use std::sync::Arc;

use async_trait::async_trait;
use hermes_core::{Identity, PipelineError, Request};
use indexmap::IndexMap;

use crate::error::{AuthFailure, AuthSetupError};

/// What a provider concluded about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials verified.
    Authenticated(Identity),
    /// The request carries no credential this provider understands.
    Absent,
    /// A credential was present but is not acceptable.
    Rejected(AuthFailure),
}

/// A pluggable authentication strategy.
///
/// Providers must not mutate shared state except through their own
/// backends (e.g. consuming a ticket).
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Name routes use to select this provider.
    fn name(&self) -> &str;

    /// Inspects the request's credentials.
    async fn authenticate(&self, request: &Request) -> AuthOutcome;

    /// `WWW-Authenticate` challenge sent with 401 responses.
    fn challenge(&self) -> Option<String> {
        None
    }
}

/// Shared provider handle.
pub type SharedAuthProvider = Arc<dyn AuthProvider>;

/// Registered providers, in registration order.
///
/// # Example
///
/// ```
/// use hermes_auth::{BearerConfig, BearerTokenProvider, ProviderRegistry};
///
/// let bearer = BearerTokenProvider::new(BearerConfig::new("hermes", [7u8; 32].to_vec())).unwrap();
/// let mut registry = ProviderRegistry::new();
/// registry.register(bearer).unwrap();
///
/// assert!(registry.resolve(&["bearer".to_string()]).is_ok());
/// assert!(registry.resolve(&["ticket".to_string()]).is_err());
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: IndexMap<String, SharedAuthProvider>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider. Names must be unique.
    pub fn register(&mut self, provider: impl AuthProvider) -> Result<(), AuthSetupError> {
        self.register_shared(Arc::new(provider))
    }

    /// Adds an already shared provider.
    pub fn register_shared(&mut self, provider: SharedAuthProvider) -> Result<(), AuthSetupError> {
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(AuthSetupError::DuplicateProvider(name));
        }
        self.providers.insert(name, provider);
        Ok(())
    }

    /// Returns true if no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Resolves a route's provider list.
    ///
    /// An empty list means every registered provider, in registration order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<SharedAuthProvider>, AuthSetupError> {
        if names.is_empty() {
            return Ok(self.providers.values().cloned().collect());
        }
        names
            .iter()
            .map(|name| {
                self.providers
                    .get(name)
                    .cloned()
                    .ok_or_else(|| AuthSetupError::UnknownProvider(name.clone()))
            })
            .collect()
    }
}

/// Runs `providers` in order and returns the first verified identity.
///
/// When none succeeds the error carries the first rejection reason (or
/// "missing credentials" if every provider found nothing) and the first
/// available challenge.
pub async fn authenticate_with(
    providers: &[SharedAuthProvider],
    request: &Request,
) -> Result<Identity, PipelineError> {
    let mut first_rejection: Option<(String, AuthFailure)> = None;

    for provider in providers {
        match provider.authenticate(request).await {
            AuthOutcome::Authenticated(identity) => {
                tracing::debug!(
                    provider = provider.name(),
                    principal = identity.principal(),
                    "request authenticated"
                );
                return Ok(identity);
            }
            AuthOutcome::Absent => {}
            AuthOutcome::Rejected(failure) => {
                tracing::debug!(provider = provider.name(), %failure, "credentials rejected");
                if first_rejection.is_none() {
                    first_rejection = Some((provider.name().to_string(), failure));
                }
            }
        }
    }

    let challenge = providers.iter().find_map(|p| p.challenge());
    let reason = match first_rejection {
        Some((provider, failure)) => format!("{provider}: {failure}"),
        None => "missing credentials".to_string(),
    };
    Err(PipelineError::Unauthenticated { reason, challenge })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Empty;

    struct Fixed {
        name: &'static str,
        outcome: AuthOutcome,
    }

    #[async_trait]
    impl AuthProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn authenticate(&self, _request: &Request) -> AuthOutcome {
            self.outcome.clone()
        }

        fn challenge(&self) -> Option<String> {
            Some(format!("{} realm=\"hermes\"", self.name))
        }
    }

    fn fixed(name: &'static str, outcome: AuthOutcome) -> SharedAuthProvider {
        Arc::new(Fixed { name, outcome })
    }

    fn request() -> Request {
        let http = http::Request::builder()
            .uri("/nodes")
            .body(Empty::<Bytes>::new())
            .unwrap();
        Request::from_http(http, 0)
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let providers = vec![
            fixed("a", AuthOutcome::Absent),
            fixed("b", AuthOutcome::Rejected(AuthFailure::TokenExpired)),
            fixed("c", AuthOutcome::Authenticated(Identity::new("carol", "c"))),
            fixed("d", AuthOutcome::Authenticated(Identity::new("dave", "d"))),
        ];
        let identity = authenticate_with(&providers, &request()).await.unwrap();
        assert_eq!(identity.principal(), "carol");
    }

    #[tokio::test]
    async fn test_reports_first_rejection() {
        let providers = vec![
            fixed("a", AuthOutcome::Absent),
            fixed("b", AuthOutcome::Rejected(AuthFailure::TokenExpired)),
            fixed("c", AuthOutcome::Rejected(AuthFailure::UnknownTicket)),
        ];
        let err = authenticate_with(&providers, &request()).await.unwrap_err();
        match err {
            PipelineError::Unauthenticated { reason, challenge } => {
                assert_eq!(reason, "b: token expired");
                assert_eq!(challenge.as_deref(), Some("a realm=\"hermes\""));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_absent() {
        let providers = vec![fixed("a", AuthOutcome::Absent)];
        let err = authenticate_with(&providers, &request()).await.unwrap_err();
        assert!(err.to_string().contains("missing credentials"));
    }

    #[test]
    fn test_registry_order_and_duplicates() {
        let mut registry = ProviderRegistry::new();
        registry.register_shared(fixed("b", AuthOutcome::Absent)).unwrap();
        registry.register_shared(fixed("a", AuthOutcome::Absent)).unwrap();
        assert_eq!(
            registry.register_shared(fixed("a", AuthOutcome::Absent)),
            Err(AuthSetupError::DuplicateProvider("a".into()))
        );

        let all: Vec<_> = registry.resolve(&[]).unwrap().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(all, vec!["b", "a"]);

        let picked: Vec<_> = registry
            .resolve(&["a".to_string(), "b".to_string()])
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(picked, vec!["a", "b"]);
    }
}

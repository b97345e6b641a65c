//! Assembling a pipeline.
//!
//! Routes are checked against the routing table as they are registered, so
//! a conflicting route is rejected at the call that adds it. Provider names
//! are resolved when the pipeline is built, which lets routes and providers
//! be registered in any order.

use std::sync::Arc;

use hermes_auth::{AuthProvider, AuthSetupError, ProviderRegistry, SharedAuthProvider};
use hermes_codec::CodecRegistry;
use hermes_router::{RouterBuilder, RouterError};
use http::Method;
use thiserror::Error;

use crate::cors::CorsPolicy;
use crate::handler::Handler;
use crate::pipeline::{Endpoint, Pipeline};
use crate::request_id::RequestIdPolicy;
use crate::route::{AuthPolicy, Module, Route};

/// Startup failures. All of them are fatal.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A route conflicts with an earlier one or has a malformed pattern.
    #[error(transparent)]
    Route(#[from] RouterError),

    /// A provider is duplicated or a route names an unknown one.
    #[error("route {route}: {source}")]
    Auth {
        /// The route being resolved, or `*` for provider registration.
        route: String,
        /// What went wrong.
        #[source]
        source: AuthSetupError,
    },

    /// A route requires authentication but no provider is registered.
    #[error("route {route} requires authentication but no auth provider is registered")]
    NoProviders {
        /// The route.
        route: String,
    },
}

/// Builds a [`Pipeline`].
///
/// # Example
///
/// ```
/// use hermes_core::Response;
/// use hermes_pipeline::{handler_fn, PipelineBuilder, Route};
/// use serde_json::json;
///
/// let mut builder = PipelineBuilder::new();
/// builder
///     .register(Route::get("/nodes/{id}", handler_fn(|request| {
///         Box::pin(async move {
///             let id = request.path_param("id").unwrap_or_default().to_string();
///             Ok::<_, hermes_core::PipelineError>(Response::ok(json!({ "id": id })))
///         })
///     })).public())
///     .unwrap();
///
/// // Same shape, different parameter name.
/// let dup = Route::get("/nodes/{name}", handler_fn(|_request| {
///     Box::pin(async { Ok::<_, hermes_core::PipelineError>(Response::no_content()) })
/// }));
/// assert!(builder.register(dup).is_err());
///
/// let pipeline = builder.build().unwrap();
/// assert_eq!(pipeline.route_count(), 1);
/// ```
pub struct PipelineBuilder {
    table: RouterBuilder<usize>,
    routes: Vec<Route>,
    providers: ProviderRegistry,
    codecs: Arc<CodecRegistry>,
    fallback: Option<Route>,
    cors: Option<CorsPolicy>,
    request_ids: RequestIdPolicy,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("routes", &self.routes.len())
            .field("providers", &self.providers)
            .field("fallback", &self.fallback.is_some())
            .field("cors", &self.cors)
            .field("request_ids", &self.request_ids)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            table: RouterBuilder::new(),
            routes: Vec::new(),
            providers: ProviderRegistry::new(),
            codecs: Arc::new(CodecRegistry::default()),
            fallback: None,
            cors: None,
            request_ids: RequestIdPolicy::new(),
        }
    }
}

impl PipelineBuilder {
    /// A builder with the JSON codec, no providers and no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the codec registry.
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    /// Enables CORS handling.
    #[must_use]
    pub fn cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Some(policy);
        self
    }

    /// Sets how request ids are assigned.
    #[must_use]
    pub fn request_ids(mut self, policy: RequestIdPolicy) -> Self {
        self.request_ids = policy;
        self
    }

    /// Answers unmatched requests with `handler` instead of 404.
    ///
    /// The fallback is public and runs without constraints.
    #[must_use]
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(Route::new(Method::GET, "/*", handler).named("fallback").public());
        self
    }

    /// Adds an auth provider. Names must be unique.
    pub fn provider(&mut self, provider: impl AuthProvider) -> Result<&mut Self, BuildError> {
        self.provider_shared(Arc::new(provider))
    }

    /// Adds an already shared auth provider.
    pub fn provider_shared(&mut self, provider: SharedAuthProvider) -> Result<&mut Self, BuildError> {
        self.providers
            .register_shared(provider)
            .map_err(|source| BuildError::Auth {
                route: "*".to_string(),
                source,
            })?;
        Ok(self)
    }

    /// Adds a route, rejecting it if it conflicts with one already added.
    pub fn register(&mut self, route: Route) -> Result<&mut Self, BuildError> {
        let index = self.routes.len();
        self.table
            .register(route.method().clone(), route.pattern(), index)?;
        tracing::debug!(route = %route.name(), "route registered");
        self.routes.push(route);
        Ok(self)
    }

    /// Adds every route of `module`.
    pub fn install(&mut self, module: &dyn Module) -> Result<&mut Self, BuildError> {
        let routes = module.routes();
        let count = routes.len();
        for route in routes {
            self.register(route)?;
        }
        tracing::info!(module = module.name(), routes = count, "module installed");
        Ok(self)
    }

    /// Freezes the routing table and resolves every route's providers.
    pub fn build(self) -> Result<Pipeline, BuildError> {
        let endpoints = self
            .routes
            .into_iter()
            .map(|route| endpoint(&self.providers, route))
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = self
            .fallback
            .map(|route| endpoint(&self.providers, route))
            .transpose()?;

        tracing::info!(
            routes = endpoints.len(),
            providers = ?self.providers.names().collect::<Vec<_>>(),
            "pipeline built"
        );

        Ok(Pipeline::new(
            self.table.build(),
            endpoints,
            fallback,
            self.codecs,
            self.cors,
            self.request_ids,
        ))
    }
}

fn endpoint(registry: &ProviderRegistry, route: Route) -> Result<Endpoint, BuildError> {
    let providers = match route.auth() {
        AuthPolicy::Public => Vec::new(),
        AuthPolicy::Required { providers, .. } => {
            if registry.is_empty() {
                return Err(BuildError::NoProviders { route: route.name() });
            }
            registry.resolve(providers).map_err(|source| BuildError::Auth {
                route: route.name(),
                source,
            })?
        }
    };
    Ok(Endpoint { route, providers })
}

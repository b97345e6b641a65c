//! Route declarations.

use std::sync::Arc;

use hermes_validation::ConstraintSet;
use http::Method;

use crate::handler::{Handler, Interceptor, SharedHandler, SharedInterceptor};

/// Who may call a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No authentication.
    Public,
    /// An identity is required.
    Required {
        /// Providers to try, in order. Empty means every registered
        /// provider in registration order.
        providers: Vec<String>,
        /// The identity must hold at least one of these. Empty means any
        /// identity is enough.
        scopes: Vec<String>,
    },
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::Required {
            providers: Vec::new(),
            scopes: Vec::new(),
        }
    }
}

impl AuthPolicy {
    /// Returns true for public routes.
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Public)
    }
}

/// A method and path pattern bound to a handler chain.
///
/// Routes require authentication unless marked [`Route::public`].
///
/// # Example
///
/// ```
/// use hermes_core::Response;
/// use hermes_pipeline::{handler_fn, Route};
/// use hermes_validation::{ConstraintSet, Field};
/// use serde_json::json;
///
/// let create = Route::post("/nodes", handler_fn(|_request| {
///     Box::pin(async { Ok::<_, hermes_core::PipelineError>(Response::created(json!({"id": 1}))) })
/// }))
/// .providers(["bearer"])
/// .scopes(["nodes:write"])
/// .validate(ConstraintSet::new().field(Field::body("name").required().string()));
///
/// assert_eq!(create.pattern(), "/nodes");
/// assert!(!create.auth().is_public());
/// ```
#[derive(Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    name: Option<String>,
    auth: AuthPolicy,
    constraints: Option<ConstraintSet>,
    before: Vec<SharedInterceptor>,
    handler: SharedHandler,
    after: Vec<SharedInterceptor>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .field("auth", &self.auth)
            .field("constraints", &self.constraints.as_ref().map(|c| c.fields().len()))
            .field("before", &self.before.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("after", &self.after.iter().map(|i| i.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Route {
    /// A route for `method` and `pattern`.
    pub fn new(method: Method, pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::with_shared(method, pattern, Arc::new(handler))
    }

    /// A route with an already shared handler.
    pub fn with_shared(method: Method, pattern: impl Into<String>, handler: SharedHandler) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            name: None,
            auth: AuthPolicy::default(),
            constraints: None,
            before: Vec::new(),
            handler,
            after: Vec::new(),
        }
    }

    /// `GET` route.
    pub fn get(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::GET, pattern, handler)
    }

    /// `POST` route.
    pub fn post(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::POST, pattern, handler)
    }

    /// `PUT` route.
    pub fn put(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::PUT, pattern, handler)
    }

    /// `PATCH` route.
    pub fn patch(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::PATCH, pattern, handler)
    }

    /// `DELETE` route.
    pub fn delete(pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::DELETE, pattern, handler)
    }

    /// Names the route for logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Skips authentication.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.auth = AuthPolicy::Public;
        self
    }

    /// Restricts authentication to these providers, tried in order.
    #[must_use]
    pub fn providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let providers = providers.into_iter().map(Into::into).collect();
        self.auth = match self.auth {
            AuthPolicy::Required { scopes, .. } => AuthPolicy::Required { providers, scopes },
            AuthPolicy::Public => AuthPolicy::Required {
                providers,
                scopes: Vec::new(),
            },
        };
        self
    }

    /// Requires at least one of `scopes`.
    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes = scopes.into_iter().map(Into::into).collect();
        self.auth = match self.auth {
            AuthPolicy::Required { providers, .. } => AuthPolicy::Required { providers, scopes },
            AuthPolicy::Public => AuthPolicy::Required {
                providers: Vec::new(),
                scopes,
            },
        };
        self
    }

    /// Checks `constraints` before the handler runs.
    #[must_use]
    pub fn validate(mut self, constraints: ConstraintSet) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Adds a pre-handler interceptor.
    #[must_use]
    pub fn before(mut self, interceptor: impl Interceptor) -> Self {
        self.before.push(Arc::new(interceptor));
        self
    }

    /// Adds a post-handler interceptor.
    #[must_use]
    pub fn after(mut self, interceptor: impl Interceptor) -> Self {
        self.after.push(Arc::new(interceptor));
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path pattern as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Name, falling back to `METHOD pattern`.
    #[must_use]
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.method, self.pattern))
    }

    /// Auth policy.
    #[must_use]
    pub fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    /// Constraint set, if any.
    #[must_use]
    pub fn constraints(&self) -> Option<&ConstraintSet> {
        self.constraints.as_ref()
    }

    pub(crate) fn before_chain(&self) -> &[SharedInterceptor] {
        &self.before
    }

    pub(crate) fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    pub(crate) fn after_chain(&self) -> &[SharedInterceptor] {
        &self.after
    }
}

/// A business module contributing routes.
///
/// ```
/// use hermes_core::Response;
/// use hermes_pipeline::{handler_fn, Module, PipelineBuilder, Route};
/// use serde_json::json;
///
/// struct Health;
///
/// impl Module for Health {
///     fn name(&self) -> &str {
///         "health"
///     }
///
///     fn routes(&self) -> Vec<Route> {
///         vec![Route::get("/healthz", handler_fn(|_request| {
///             Box::pin(async { Ok::<_, hermes_core::PipelineError>(Response::ok(json!({"ok": true}))) })
///         }))
///         .public()]
///     }
/// }
///
/// let mut builder = PipelineBuilder::new();
/// builder.install(&Health).unwrap();
/// assert!(builder.build().is_ok());
/// ```
pub trait Module: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Routes to register.
    fn routes(&self) -> Vec<Route>;
}

//! Router construction and lookup.
//!
//! Routes are registered through a [`RouterBuilder`], which rejects
//! conflicting routes as they come in. [`RouterBuilder::build`] freezes the
//! table into a [`Router`] that only supports lookups and can be shared
//! across threads freely.

use std::borrow::Cow;

use http::Method;

use crate::error::{RouteConflict, RouterError};
use crate::node::{Captures, Node};
use crate::params::Params;
use crate::pattern::Pattern;
use crate::RouteMatch;

/// One registered route.
#[derive(Debug, Clone)]
struct Entry<T> {
    method: Method,
    pattern: Pattern,
    value: T,
}

/// Collects routes before freezing them into a [`Router`].
///
/// # Example
///
/// ```rust
/// use hermes_router::RouterBuilder;
/// use http::Method;
///
/// let mut builder = RouterBuilder::new();
/// builder.register(Method::GET, "/nodes/{id}", "getNode").unwrap();
/// builder.register(Method::GET, "/nodes/self", "getSelf").unwrap();
///
/// // Same method and shape as an existing route.
/// assert!(builder.register(Method::GET, "/nodes/{name}", "other").is_err());
///
/// let router = builder.build();
/// assert_eq!(*router.match_route(&Method::GET, "/nodes/self").unwrap().value, "getSelf");
/// ```
#[derive(Debug, Clone)]
pub struct RouterBuilder<T> {
    root: Node,
    entries: Vec<Entry<T>>,
}

impl<T> Default for RouterBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouterBuilder<T> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            entries: Vec::new(),
        }
    }

    /// Registers `value` under `method` and `pattern`.
    ///
    /// Fails with [`RouterError::Conflict`] if a route with the same method
    /// and the same shape is already registered, and with
    /// [`RouterError::InvalidPattern`] if the pattern does not parse.
    pub fn register(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouterError> {
        let pattern = Pattern::parse(pattern)?;
        let index = self.entries.len();

        if let Err(existing) = self.root.insert(pattern.segments(), method.clone(), index) {
            return Err(RouteConflict {
                method,
                pattern: pattern.as_str().to_string(),
                existing: self.entries[existing].pattern.as_str().to_string(),
            }
            .into());
        }

        self.entries.push(Entry {
            method,
            pattern,
            value,
        });
        Ok(())
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the table.
    #[must_use]
    pub fn build(self) -> Router<T> {
        Router {
            root: self.root,
            entries: self.entries,
        }
    }
}

/// An immutable routing table.
///
/// # Route precedence
///
/// For a given method and path the router picks the route whose segments
/// rank lowest, compared position by position:
///
/// 1. **Literal segments** (`/nodes/self`)
/// 2. **Parameter segments** (`/nodes/{id}`)
/// 3. **Wildcard segments** (`/nodes/*`)
///
/// A more specific route that fails further down the path hands over to the
/// next candidate, so `/a/{x}/c` does not shadow `/a/*` for `/a/b/d`. See
/// [`Pattern::precedence`].
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node,
    entries: Vec<Entry<T>>,
}

impl<T> Router<T> {
    /// Matches `method` and `path` against the table.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hermes_router::RouterBuilder;
    /// use http::Method;
    ///
    /// let mut builder = RouterBuilder::new();
    /// builder.register(Method::GET, "/files/*path", 1).unwrap();
    /// let router = builder.build();
    ///
    /// let m = router.match_route(&Method::GET, "/files/a/b.txt").unwrap();
    /// assert_eq!(*m.value, 1);
    /// assert_eq!(m.params.get("path"), Some("a/b.txt"));
    /// ```
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, T>> {
        let decoded = split_path(path);
        let segments: Vec<&str> = decoded.iter().map(AsRef::as_ref).collect();
        let mut captures = Captures::new();
        let index = self.root.find(&segments, method, &mut captures)?;
        let entry = &self.entries[index];

        Some(RouteMatch {
            value: &entry.value,
            pattern: &entry.pattern,
            params: Params::from_captures(entry.pattern.param_names(), captures.into_iter()),
        })
    }

    /// Returns every method with a route matching `path`.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let decoded = split_path(path);
        let segments: Vec<&str> = decoded.iter().map(AsRef::as_ref).collect();
        let mut methods = Vec::new();
        self.root.methods_for(&segments, &mut methods);
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods.dedup();
        methods
    }

    /// Iterates over registered routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &Pattern, &T)> {
        self.entries.iter().map(|e| (&e.method, &e.pattern, &e.value))
    }

    /// Returns the number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Splits `path` on `/` and percent-decodes each segment exactly once, so
/// `%2F` stays inside its segment. A segment that does not decode to UTF-8 is
/// matched verbatim.
fn split_path(path: &str) -> Vec<Cow<'_, str>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment)))
        .collect()
}

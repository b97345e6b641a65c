//! Trie router for Hermes.
//!
//! Routes are method + path pattern pairs bound to an arbitrary value (the
//! pipeline binds handler chains). The table is built once through a
//! [`RouterBuilder`], which rejects ambiguous routes eagerly, and then frozen
//! into a [`Router`] that is read-only and safe to share across threads.
//!
//! # Patterns
//!
//! - **Literal segments**: `/nodes/self`
//! - **Parameters**: `/nodes/{id}` captures one segment
//! - **Trailing wildcard**: `/files/*path` (or bare `*`) captures the rest
//!
//! # Example
//!
//! ```rust
//! use hermes_router::RouterBuilder;
//! use http::Method;
//!
//! let mut builder = RouterBuilder::new();
//! builder.register(Method::GET, "/nodes", "listNodes").unwrap();
//! builder.register(Method::GET, "/nodes/{id}", "getNode").unwrap();
//! builder.register(Method::GET, "/nodes/self", "getSelf").unwrap();
//! let router = builder.build();
//!
//! let m = router.match_route(&Method::GET, "/nodes/42").unwrap();
//! assert_eq!(*m.value, "getNode");
//! assert_eq!(m.params.get("id"), Some("42"));
//!
//! let m = router.match_route(&Method::GET, "/nodes/self").unwrap();
//! assert_eq!(*m.value, "getSelf");
//! ```
//!
//! # Architecture
//!
//! ```text
//!                 (root)
//!                   │
//!                "nodes"  [GET listNodes]
//!              ┌────┴────┐
//!           "self"      {param}
//!       [GET getSelf]  [GET getNode]
//! ```

mod error;
mod method_router;
mod node;
mod params;
mod pattern;
mod router;

pub use error::{RouteConflict, RouterError};
pub use method_router::MethodRouter;
pub use node::{Node, SegmentKind};
pub use params::Params;
pub use pattern::{Pattern, Segment, ANONYMOUS_WILDCARD};
pub use router::{Router, RouterBuilder};

/// A successful lookup: the bound value and the extracted parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, T> {
    /// Value registered for the matched route.
    pub value: &'a T,
    /// Pattern of the matched route.
    pub pattern: &'a Pattern,
    /// Extracted path parameters, in path order.
    pub params: Params,
}

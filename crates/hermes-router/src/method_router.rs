//! Per-node method table.
//!
//! Each trie node that terminates at least one route owns a [`MethodRouter`]
//! mapping HTTP methods to indices into the router's route list.

use http::Method;
use smallvec::SmallVec;

/// Maps HTTP methods to route indices for one trie node.
///
/// Lookups are linear; a node rarely carries more than a handful of methods.
#[derive(Debug, Clone, Default)]
pub struct MethodRouter {
    entries: SmallVec<[(Method, usize); 4]>,
}

impl MethodRouter {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `method` to `route`.
    ///
    /// Returns the index already bound to `method`, leaving the table
    /// unchanged, if there is one.
    pub fn insert(&mut self, method: Method, route: usize) -> Result<(), usize> {
        if let Some(existing) = self.get(&method) {
            return Err(existing);
        }
        self.entries.push((method, route));
        Ok(())
    }

    /// Returns the route index bound to `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<usize> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, route)| *route)
    }

    /// Iterates over the bound methods.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.entries.iter().map(|(m, _)| m)
    }

    /// Returns true if no method is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut table = MethodRouter::new();
        assert!(table.is_empty());
        table.insert(Method::GET, 0).unwrap();
        table.insert(Method::POST, 3).unwrap();

        assert_eq!(table.get(&Method::GET), Some(0));
        assert_eq!(table.get(&Method::POST), Some(3));
        assert_eq!(table.get(&Method::DELETE), None);
    }

    #[test]
    fn test_duplicate_method_reports_existing() {
        let mut table = MethodRouter::new();
        table.insert(Method::GET, 1).unwrap();
        assert_eq!(table.insert(Method::GET, 2), Err(1));
        assert_eq!(table.get(&Method::GET), Some(1));
    }

    #[test]
    fn test_custom_method() {
        let purge = Method::from_bytes(b"PURGE").unwrap();
        let mut table = MethodRouter::new();
        table.insert(purge.clone(), 7).unwrap();
        assert_eq!(table.get(&purge), Some(7));
        assert_eq!(table.methods().count(), 1);
    }
}

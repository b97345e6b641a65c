//! Trie node implementation.
//!
//! Each node stands for one path segment. Children are split by kind so that
//! matching can try them in precedence order: literal children (sorted, found
//! by binary search), then the single parameter child, then the single
//! wildcard child.

use http::Method;
use smallvec::SmallVec;

use crate::method_router::MethodRouter;
use crate::pattern::Segment;

/// Raw captured values collected during a match, in path order.
pub(crate) type Captures = SmallVec<[String; 4]>;

/// Kind of segment a node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment (e.g. "nodes").
    Static,
    /// Parameter segment; captures exactly one path segment.
    Param,
    /// Wildcard segment; captures the rest of the path.
    Wildcard,
}

/// A node in the routing trie.
#[derive(Debug, Clone)]
pub struct Node {
    /// Literal text for static nodes, empty otherwise.
    pub segment: String,

    /// What kind of segment this node matches.
    pub kind: SegmentKind,

    /// Routes terminating at this node, by method.
    pub methods: MethodRouter,

    /// Literal children, sorted by segment for binary search.
    pub static_children: Vec<Node>,

    /// Parameter child (at most one per node).
    pub param_child: Option<Box<Node>>,

    /// Wildcard child (at most one per node, always a leaf).
    pub wildcard_child: Option<Box<Node>>,
}

impl Node {
    fn with_kind(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            methods: MethodRouter::new(),
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root node.
    #[must_use]
    pub fn root() -> Self {
        Self::with_kind("", SegmentKind::Static)
    }

    /// Inserts a route index under `segments` for `method`.
    ///
    /// Returns the index of the route already occupying the same leaf and
    /// method, if any. The tree is left unchanged apart from empty
    /// intermediate nodes in that case.
    pub(crate) fn insert(
        &mut self,
        segments: &[Segment],
        method: Method,
        route: usize,
    ) -> Result<(), usize> {
        let Some((first, rest)) = segments.split_first() else {
            return self.methods.insert(method, route);
        };

        match first {
            Segment::Literal(text) => {
                let index = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(text))
                {
                    Ok(index) => index,
                    Err(index) => {
                        self.static_children
                            .insert(index, Self::with_kind(text.clone(), SegmentKind::Static));
                        index
                    }
                };
                self.static_children[index].insert(rest, method, route)
            }
            Segment::Param(_) => self
                .param_child
                .get_or_insert_with(|| Box::new(Self::with_kind("", SegmentKind::Param)))
                .insert(rest, method, route),
            Segment::Wildcard(_) => self
                .wildcard_child
                .get_or_insert_with(|| Box::new(Self::with_kind("", SegmentKind::Wildcard)))
                .insert(rest, method, route),
        }
    }

    /// Finds the route for `method` matching `segments`.
    ///
    /// Children are tried literal first, then parameter, then wildcard. A
    /// branch that fails discards whatever it captured before the next one is
    /// tried.
    pub(crate) fn find(
        &self,
        segments: &[&str],
        method: &Method,
        captures: &mut Captures,
    ) -> Option<usize> {
        let Some((first, rest)) = segments.split_first() else {
            return self.methods.get(method);
        };

        if let Some(child) = self.find_static_child(first) {
            if let Some(route) = child.find(rest, method, captures) {
                return Some(route);
            }
        }

        if let Some(child) = &self.param_child {
            let mark = captures.len();
            captures.push((*first).to_string());
            if let Some(route) = child.find(rest, method, captures) {
                return Some(route);
            }
            captures.truncate(mark);
        }

        if let Some(child) = &self.wildcard_child {
            if let Some(route) = child.methods.get(method) {
                captures.push(segments.join("/"));
                return Some(route);
            }
        }

        None
    }

    /// Collects every method for which some route matches `segments`.
    pub(crate) fn methods_for(&self, segments: &[&str], out: &mut Vec<Method>) {
        let Some((first, rest)) = segments.split_first() else {
            out.extend(self.methods.methods().cloned());
            return;
        };
        if let Some(child) = self.find_static_child(first) {
            child.methods_for(rest, out);
        }
        if let Some(child) = &self.param_child {
            child.methods_for(rest, out);
        }
        if let Some(child) = &self.wildcard_child {
            out.extend(child.methods.methods().cloned());
        }
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    fn insert(root: &mut Node, method: Method, pattern: &str, route: usize) -> Result<(), usize> {
        let pattern = Pattern::parse(pattern).unwrap();
        root.insert(pattern.segments(), method, route)
    }

    fn find(root: &Node, method: &Method, path: &str) -> Option<(usize, Vec<String>)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut captures = Captures::new();
        root.find(&segments, method, &mut captures)
            .map(|route| (route, captures.into_vec()))
    }

    #[test]
    fn test_static_children_stay_sorted() {
        let mut root = Node::root();
        insert(&mut root, Method::GET, "/zeta", 0).unwrap();
        insert(&mut root, Method::GET, "/alpha", 1).unwrap();
        insert(&mut root, Method::GET, "/mid", 2).unwrap();

        let names: Vec<_> = root.static_children.iter().map(|c| c.segment.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_duplicate_leaf_reports_existing() {
        let mut root = Node::root();
        insert(&mut root, Method::GET, "/nodes/{id}", 0).unwrap();
        assert_eq!(insert(&mut root, Method::GET, "/nodes/{name}", 1), Err(0));
        assert!(insert(&mut root, Method::DELETE, "/nodes/{name}", 1).is_ok());
    }

    #[test]
    fn test_backtracking_discards_failed_captures() {
        let mut root = Node::root();
        insert(&mut root, Method::GET, "/a/{x}/c", 0).unwrap();
        insert(&mut root, Method::GET, "/a/*rest", 1).unwrap();

        let (route, captures) = find(&root, &Method::GET, "/a/b/d").unwrap();
        assert_eq!(route, 1);
        assert_eq!(captures, vec!["b/d".to_string()]);
    }

    #[test]
    fn test_method_aware_backtracking() {
        let mut root = Node::root();
        insert(&mut root, Method::GET, "/nodes/self", 0).unwrap();
        insert(&mut root, Method::POST, "/nodes/{id}", 1).unwrap();

        let (route, captures) = find(&root, &Method::POST, "/nodes/self").unwrap();
        assert_eq!(route, 1);
        assert_eq!(captures, vec!["self".to_string()]);
    }

    #[test]
    fn test_wildcard_needs_a_segment() {
        let mut root = Node::root();
        insert(&mut root, Method::GET, "/files/*", 0).unwrap();
        assert!(find(&root, &Method::GET, "/files").is_none());
        assert!(find(&root, &Method::GET, "/files/x").is_some());
    }
}

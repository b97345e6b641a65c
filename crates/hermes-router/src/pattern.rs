//! Route pattern parsing.
//!
//! A pattern is a `/`-separated list of segments:
//!
//! - literal segments (`nodes`, `self`)
//! - named parameters (`{id}`) matching exactly one path segment
//! - an optional trailing wildcard (`*` or `*rest`) matching one or more
//!   remaining segments
//!
//! Empty segments are ignored, so `/nodes/` and `/nodes` are the same pattern.

use std::cmp::Ordering;
use std::fmt;

use crate::error::RouterError;

/// Name under which a bare `*` wildcard is captured.
pub const ANONYMOUS_WILDCARD: &str = "*";

/// One parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Literal text that must match exactly.
    Literal(String),
    /// Named parameter capturing one segment.
    Param(String),
    /// Trailing wildcard capturing the remainder of the path.
    Wildcard(String),
}

impl Segment {
    /// Rank used for precedence: literal < param < wildcard.
    const fn rank(&self) -> u8 {
        match self {
            Self::Literal(_) => 0,
            Self::Param(_) => 1,
            Self::Wildcard(_) => 2,
        }
    }

    /// Returns true if two segments occupy the same trie slot.
    ///
    /// Parameter and wildcard names do not take part in matching, so
    /// `{id}` and `{name}` are the same slot.
    pub(crate) fn same_slot(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Param(_), Self::Param(_)) | (Self::Wildcard(_), Self::Wildcard(_)) => true,
            _ => false,
        }
    }
}

/// A parsed route pattern.
///
/// # Example
///
/// ```rust
/// use hermes_router::{Pattern, Segment};
///
/// let pattern = Pattern::parse("/nodes/{id}/logs/*").unwrap();
/// assert_eq!(pattern.segments().len(), 4);
/// assert_eq!(pattern.segments()[1], Segment::Param("id".to_string()));
/// assert_eq!(pattern.param_names().collect::<Vec<_>>(), vec!["id", "*"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parses a pattern string.
    ///
    /// Fails with [`RouterError::InvalidPattern`] when a wildcard is not the
    /// last segment, a parameter name is empty or repeated, or braces are
    /// unbalanced.
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        let invalid = |reason: &str| RouterError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(inner) = part.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| invalid("unterminated parameter"))?;
                if name.is_empty() || name.contains(['{', '}', '*']) {
                    return Err(invalid("parameter names must be non-empty identifiers"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if index + 1 != parts.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                if name.contains(['{', '}', '*']) {
                    return Err(invalid("invalid wildcard name"));
                }
                let name = if name.is_empty() { ANONYMOUS_WILDCARD } else { name };
                Segment::Wildcard(name.to_string())
            } else {
                if part.contains(['{', '}']) {
                    return Err(invalid("braces are only allowed around a whole segment"));
                }
                Segment::Literal((*part).to_string())
            };
            segments.push(segment);
        }

        let mut seen: Vec<&str> = Vec::new();
        for name in segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::Wildcard(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        }) {
            if seen.contains(&name) {
                return Err(invalid("duplicate parameter name"));
            }
            seen.push(name);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the pattern as it was registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the capture names in path order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::Wildcard(n) => Some(n.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Returns true if both patterns would occupy the same trie leaf.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.same_slot(b))
    }

    /// Compares two patterns by match precedence.
    ///
    /// Segments are compared position by position, literal before parameter
    /// before wildcard. The first differing kind decides; if the kinds agree
    /// everywhere the shorter pattern comes first. Literal text is used as a
    /// final tiebreak so the order is total over distinct shapes.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match a.rank().cmp(&b.rank()) {
                Ordering::Equal => {}
                decided => return decided,
            }
        }
        self.segments
            .len()
            .cmp(&other.segments.len())
            .then_with(|| {
                let literals = |p: &Self| {
                    p.segments
                        .iter()
                        .filter_map(|s| match s {
                            Segment::Literal(l) => Some(l.clone()),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                };
                literals(self).cmp(&literals(other))
            })
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

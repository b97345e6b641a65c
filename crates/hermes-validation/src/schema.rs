//! Constraint sets: which fields to check and how.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::constraint::{Constraint, FieldType};

/// Where a field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A dotted path into the decoded body, e.g. `spec.replicas`.
    Body(String),
    /// A path parameter.
    Path(String),
    /// The first value of a query parameter.
    Query(String),
}

impl Target {
    /// Field name used in violations: body paths as-is, parameters
    /// prefixed with `path.` or `query.`.
    #[must_use]
    pub fn field_name(&self) -> String {
        match self {
            Self::Body(path) => path.clone(),
            Self::Path(name) => format!("path.{name}"),
            Self::Query(name) => format!("query.{name}"),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.field_name())
    }
}

/// Constraints on one field.
///
/// Constraints are checked in the order they were added.
#[derive(Debug, Clone)]
pub struct Field {
    target: Target,
    constraints: Vec<Constraint>,
}

impl Field {
    /// A body field at dotted `path`.
    #[must_use]
    pub fn body(path: impl Into<String>) -> Self {
        Self::new(Target::Body(path.into()))
    }

    /// A path parameter.
    #[must_use]
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(Target::Path(name.into()))
    }

    /// A query parameter.
    #[must_use]
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(Target::Query(name.into()))
    }

    fn new(target: Target) -> Self {
        Self {
            target,
            constraints: Vec::new(),
        }
    }

    /// Adds any constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// The field must be present.
    #[must_use]
    pub fn required(self) -> Self {
        self.constraint(Constraint::Required)
    }

    /// The field must have `ty`.
    #[must_use]
    pub fn of_type(self, ty: FieldType) -> Self {
        self.constraint(Constraint::Type(ty))
    }

    /// Shorthand for `of_type(FieldType::String)`.
    #[must_use]
    pub fn string(self) -> Self {
        self.of_type(FieldType::String)
    }

    /// Shorthand for `of_type(FieldType::Integer)`.
    #[must_use]
    pub fn integer(self) -> Self {
        self.of_type(FieldType::Integer)
    }

    /// Shorthand for `of_type(FieldType::Boolean)`.
    #[must_use]
    pub fn boolean(self) -> Self {
        self.of_type(FieldType::Boolean)
    }

    /// Inclusive numeric bounds.
    #[must_use]
    pub fn range(self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraint(Constraint::Range { min, max })
    }

    /// Inclusive length bounds.
    #[must_use]
    pub fn length(self, min: Option<usize>, max: Option<usize>) -> Self {
        self.constraint(Constraint::Length { min, max })
    }

    /// The string must match `regex`.
    #[must_use]
    pub fn pattern(self, regex: Regex) -> Self {
        self.constraint(Constraint::Pattern(regex))
    }

    /// The value must be one of `allowed`.
    #[must_use]
    pub fn one_of<I, V>(self, allowed: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.constraint(Constraint::OneOf(allowed.into_iter().map(Into::into).collect()))
    }

    /// A named predicate.
    #[must_use]
    pub fn custom<F>(self, name: impl Into<String>, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.constraint(Constraint::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
            message: message.into(),
        })
    }

    /// Where the value comes from.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Constraints in check order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub(crate) fn is_required(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, Constraint::Required))
    }

    pub(crate) fn declared_type(&self) -> Option<FieldType> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Type(ty) => Some(*ty),
            _ => None,
        })
    }
}

/// The constraints a route applies before its handler runs.
///
/// # Example
///
/// ```
/// use hermes_validation::{ConstraintSet, Field};
///
/// let set = ConstraintSet::new()
///     .field(Field::body("name").required().string().length(Some(1), Some(63)))
///     .field(Field::body("spec.replicas").integer().range(Some(0.0), Some(100.0)))
///     .field(Field::query("limit").integer().range(Some(1.0), Some(500.0)));
///
/// assert_eq!(set.fields().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    fields: Vec<Field>,
}

impl ConstraintSet {
    /// An empty set, which accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields in check order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns true if there is nothing to check.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if any field reads the body.
    #[must_use]
    pub fn reads_body(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f.target, Target::Body(_)))
    }
}

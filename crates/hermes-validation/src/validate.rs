//! Running a constraint set against a request's data.

use hermes_core::{Params, QueryParams, Violation};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::schema::{ConstraintSet, Field, Target};

/// The data a constraint set is checked against.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    /// Decoded body, `null` when there is none.
    pub body: &'a Value,
    /// Bound path parameters.
    pub path: &'a Params,
    /// Query parameters.
    pub query: &'a QueryParams,
}

/// Data that passed validation.
///
/// Parameters with a declared type hold the coerced value (`"42"` becomes
/// `42`); all others stay strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidPayload {
    body: Value,
    path: Map<String, Value>,
    query: Map<String, Value>,
}

impl ValidPayload {
    /// The body.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// The body as `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }

    /// A path parameter.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&Value> {
        self.path.get(name)
    }

    /// A query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&Value> {
        self.query.get(name)
    }

    /// All path parameters.
    #[must_use]
    pub fn path_params(&self) -> &Map<String, Value> {
        &self.path
    }

    /// All query parameters, first value each.
    #[must_use]
    pub fn query_params(&self) -> &Map<String, Value> {
        &self.query
    }
}

/// Checks `input` against `set`.
///
/// Fields are evaluated independently and every violation is returned. A
/// missing optional field is skipped; a missing required field reports
/// only `required`. Once a field fails its `type` constraint, its other
/// constraints are not evaluated.
///
/// # Example
///
/// ```
/// use hermes_core::{Params, QueryParams};
/// use hermes_validation::{validate, ConstraintSet, Field, Input};
/// use serde_json::json;
///
/// let set = ConstraintSet::new()
///     .field(Field::body("name").required().string())
///     .field(Field::body("replicas").integer().range(Some(1.0), None));
///
/// let body = json!({"replicas": 0});
/// let (path, query) = (Params::new(), QueryParams::default());
/// let violations = validate(Input { body: &body, path: &path, query: &query }, &set).unwrap_err();
///
/// let fields: Vec<_> = violations.iter().map(|v| (v.field.as_str(), v.constraint.as_str())).collect();
/// assert_eq!(fields, [("name", "required"), ("replicas", "range")]);
/// ```
pub fn validate(input: Input<'_>, set: &ConstraintSet) -> Result<ValidPayload, Vec<Violation>> {
    let mut payload = ValidPayload {
        body: input.body.clone(),
        path: input
            .path
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
        query: input
            .query
            .iter()
            .filter_map(|(k, values)| {
                values
                    .first()
                    .map(|v| (k.to_string(), Value::String(v.clone())))
            })
            .collect(),
    };
    let mut violations = Vec::new();

    for field in set.fields() {
        let value = match field.target() {
            Target::Body(path) => lookup(input.body, path).cloned(),
            Target::Path(name) => input.path.get(name).map(|raw| param_value(field, raw)),
            Target::Query(name) => input.query.first(name).map(|raw| param_value(field, raw)),
        };
        check_field(field, value.as_ref(), &mut violations);

        if let Some(value) = value {
            match field.target() {
                Target::Path(name) => {
                    payload.path.insert(name.clone(), value);
                }
                Target::Query(name) => {
                    payload.query.insert(name.clone(), value);
                }
                Target::Body(_) => {}
            }
        }
    }

    if violations.is_empty() {
        Ok(payload)
    } else {
        tracing::debug!(count = violations.len(), "request failed validation");
        Err(violations)
    }
}

fn check_field(field: &Field, value: Option<&Value>, violations: &mut Vec<Violation>) {
    let name = field.target().field_name();
    let Some(value) = value else {
        if field.is_required() {
            violations.push(Violation::new(name, "required", "is required"));
        }
        return;
    };

    for constraint in field.constraints() {
        if let Err(message) = constraint.check(value) {
            let is_type = matches!(constraint, crate::Constraint::Type(_));
            violations.push(Violation::new(name.clone(), constraint.name(), message));
            if is_type {
                return;
            }
        }
    }
}

/// Parameter text converted by the field's declared type. Text that does
/// not convert stays a string so the `type` constraint reports it.
fn param_value(field: &Field, raw: &str) -> Value {
    field
        .declared_type()
        .and_then(|ty| ty.coerce(raw))
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Resolves a dotted path. Numeric segments index arrays. `null` counts as
/// absent.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

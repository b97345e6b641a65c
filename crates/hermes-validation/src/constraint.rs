//! Single-field constraints.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

/// JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A string.
    String,
    /// A whole number.
    Integer,
    /// Any number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// An array.
    Array,
    /// An object.
    Object,
}

impl FieldType {
    /// Lowercase name used in messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Returns true if `value` has this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    /// Converts a parameter string into a value of this type.
    ///
    /// Parameters arrive as text; `"42"` becomes `42` for integers.
    #[must_use]
    pub fn coerce(self, raw: &str) -> Option<Value> {
        match self {
            Self::String => Some(Value::String(raw.to_string())),
            Self::Integer => raw.parse::<i64>().ok().map(Value::from),
            Self::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::from),
            Self::Boolean => match raw {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Self::Array | Self::Object => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate used by [`Constraint::Custom`].
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One rule applied to one field.
#[derive(Clone)]
pub enum Constraint {
    /// The field must be present and not `null`.
    Required,
    /// The field must have this type.
    Type(FieldType),
    /// Numeric bounds, inclusive.
    Range {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Length bounds for strings (in characters) and arrays, inclusive.
    Length {
        /// Lower bound.
        min: Option<usize>,
        /// Upper bound.
        max: Option<usize>,
    },
    /// Strings must match.
    Pattern(Regex),
    /// The value must equal one of these.
    OneOf(Vec<Value>),
    /// A named predicate.
    Custom {
        /// Constraint name reported in violations.
        name: String,
        /// Returns true for acceptable values.
        predicate: Predicate,
        /// Message reported in violations.
        message: String,
    },
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::Type(t) => f.debug_tuple("Type").field(t).finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl Constraint {
    /// Name reported in violations.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Required => "required",
            Self::Type(_) => "type",
            Self::Range { .. } => "range",
            Self::Length { .. } => "length",
            Self::Pattern(_) => "pattern",
            Self::OneOf(_) => "one_of",
            Self::Custom { name, .. } => name,
        }
    }

    /// Checks a present value. Returns the violation message on failure.
    ///
    /// `Required` always passes here: presence is decided by the caller.
    pub(crate) fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Required => Ok(()),
            Self::Type(expected) => {
                if expected.matches(value) {
                    Ok(())
                } else {
                    Err(format!("must be of type {expected}"))
                }
            }
            Self::Range { min, max } => {
                let Some(n) = value.as_f64() else {
                    return Err("must be a number".to_string());
                };
                if min.is_some_and(|min| n < min) || max.is_some_and(|max| n > max) {
                    Err(bounds_message("must be", *min, *max))
                } else {
                    Ok(())
                }
            }
            Self::Length { min, max } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    _ => return Err("must be a string or an array".to_string()),
                };
                if min.is_some_and(|min| len < min) || max.is_some_and(|max| len > max) {
                    Err(bounds_message("length must be", *min, *max))
                } else {
                    Ok(())
                }
            }
            Self::Pattern(re) => match value.as_str() {
                Some(s) if re.is_match(s) => Ok(()),
                Some(_) => Err(format!("must match {}", re.as_str())),
                None => Err("must be a string".to_string()),
            },
            Self::OneOf(allowed) => {
                if allowed.contains(value) {
                    Ok(())
                } else {
                    let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
                    Err(format!("must be one of {}", choices.join(", ")))
                }
            }
            Self::Custom {
                predicate, message, ..
            } => {
                if predicate(value) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
        }
    }
}

fn bounds_message<T: fmt::Display>(prefix: &str, min: Option<T>, max: Option<T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{prefix} between {min} and {max}"),
        (Some(min), None) => format!("{prefix} at least {min}"),
        (None, Some(max)) => format!("{prefix} at most {max}"),
        (None, None) => format!("{prefix} in range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_type() {
        assert!(FieldType::Integer.matches(&json!(3)));
        assert!(!FieldType::Integer.matches(&json!(3.5)));
        assert!(FieldType::Number.matches(&json!(3.5)));
    }

    #[test]
    fn test_coerce() {
        assert_eq!(FieldType::Integer.coerce("42"), Some(json!(42)));
        assert_eq!(FieldType::Integer.coerce("4x"), None);
        assert_eq!(FieldType::Boolean.coerce("true"), Some(json!(true)));
        assert_eq!(FieldType::Number.coerce("NaN"), None);
        assert_eq!(FieldType::Object.coerce("{}"), None);
    }

    #[test]
    fn test_range_and_length_messages() {
        let range = Constraint::Range {
            min: Some(1.0),
            max: Some(10.0),
        };
        assert!(range.check(&json!(5)).is_ok());
        assert_eq!(range.check(&json!(11)).unwrap_err(), "must be between 1 and 10");

        let length = Constraint::Length {
            min: Some(2),
            max: None,
        };
        assert_eq!(length.check(&json!("é")).unwrap_err(), "length must be at least 2");
        assert!(length.check(&json!([1, 2])).is_ok());
    }

    #[test]
    fn test_one_of_and_custom() {
        let one_of = Constraint::OneOf(vec![json!("up"), json!("down")]);
        assert!(one_of.check(&json!("up")).is_ok());
        assert!(one_of.check(&json!("sideways")).is_err());

        let even = Constraint::Custom {
            name: "even".into(),
            predicate: Arc::new(|v| v.as_i64().is_some_and(|n| n % 2 == 0)),
            message: "must be even".into(),
        };
        assert_eq!(even.name(), "even");
        assert_eq!(even.check(&json!(3)).unwrap_err(), "must be even");
    }
}

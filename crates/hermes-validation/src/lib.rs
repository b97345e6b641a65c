//! # Hermes Validation
//!
//! Declarative checks on request bodies and parameters.
//!
//! A route carries a [`ConstraintSet`]; the pipeline runs it after
//! authentication. Every violation is collected so a client learns about
//! all bad fields in one round trip.

#![doc(html_root_url = "https://docs.rs/hermes-validation/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod constraint;
mod schema;
mod validate;

pub use constraint::{Constraint, FieldType, Predicate};
pub use schema::{ConstraintSet, Field, Target};
pub use validate::{validate, Input, ValidPayload};

pub use regex::Regex;

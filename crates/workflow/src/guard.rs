//! Structured edge predicates.
//!
//! A guard compares the value at a state path against a literal. Guards are
//! plain data: they are evaluated by the execution crate against the state
//! store and never executed as code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a [`Guard`].
///
/// Operators this version does not recognise deserialize as
/// [`Operator::Unknown`] and always evaluate to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// The field equals the literal. Numbers compare by value (`1 == 1.0`).
    Equals,
    /// The field is present and differs from the literal.
    NotEquals,
    /// Substring for strings, element for arrays, key for objects.
    Contains,
    /// Numeric or lexicographic `field > literal`.
    GreaterThan,
    /// Numeric or lexicographic `field < literal`.
    LessThan,
    /// The field is present (the literal is ignored).
    Exists,
    /// Anything else found in a document.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Exists => "exists",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// `{field, operator, value}`: the value at state path `field` compared with
/// the literal `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    /// Dotted state path, e.g. `nodes.check_calendar.available`.
    #[serde(alias = "field_path")]
    pub field: String,
    /// The comparison to apply.
    pub operator: Operator,
    /// The literal to compare against.
    #[serde(default, alias = "literal")]
    pub value: Value,
}

impl Guard {
    /// Create a guard.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// `field == value`
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Equals, value)
    }

    /// `field != value`
    #[must_use]
    pub fn not_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::NotEquals, value)
    }

    /// `value ∈ field`
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Contains, value)
    }

    /// `field > value`
    #[must_use]
    pub fn greater_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::GreaterThan, value)
    }

    /// `field < value`
    #[must_use]
    pub fn less_than(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::LessThan, value)
    }

    /// `field` is present.
    #[must_use]
    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserializes_with_long_field_names() {
        let guard: Guard = serde_json::from_value(json!({
            "field_path": "trigger.priority",
            "operator": "greater_than",
            "literal": 3
        }))
        .unwrap();
        assert_eq!(guard, Guard::greater_than("trigger.priority", 3));
    }

    #[test]
    fn unrecognised_operator_is_preserved_as_unknown() {
        let guard: Guard = serde_json::from_value(json!({
            "field": "a",
            "operator": "matches_regex",
            "value": ".*"
        }))
        .unwrap();
        assert_eq!(guard.operator, Operator::Unknown);
    }

    #[test]
    fn exists_needs_no_literal() {
        let guard: Guard =
            serde_json::from_value(json!({"field": "a.b", "operator": "exists"})).unwrap();
        assert_eq!(guard, Guard::exists("a.b"));
    }
}

//! Guard evaluation against the state store.
//!
//! Evaluation is fail-closed: a missing field, an unknown operator, or a
//! comparison between incompatible types yields `false`. Nothing here can
//! error or touch the store.

use std::cmp::Ordering;

use apollo_workflow::{Guard, Operator};
use serde_json::Value;

use crate::store::StateStore;

/// Evaluate `guard` against `state`.
#[must_use]
pub fn evaluate(guard: &Guard, state: &StateStore) -> bool {
    let Some(actual) = state.get_opt(&guard.field) else {
        return false;
    };
    let expected = &guard.value;

    match guard.operator {
        Operator::Exists => !actual.is_null(),
        Operator::Equals => values_equal(actual, expected),
        Operator::NotEquals => !values_equal(actual, expected),
        Operator::Contains => contains(actual, expected),
        Operator::GreaterThan => compare(actual, expected) == Some(Ordering::Greater),
        Operator::LessThan => compare(actual, expected) == Some(Ordering::Less),
        Operator::Unknown => {
            tracing::debug!(field = %guard.field, "guard with unknown operator evaluates to false");
            false
        }
    }
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn state() -> StateStore {
        let Value::Object(map) = json!({
            "trigger": {
                "priority": 5,
                "ratio": 0.5,
                "name": "quarterly review",
                "tags": ["urgent", "finance", 3],
                "meta": {"owner": "ops"},
                "empty": null,
                "flag": true
            }
        }) else {
            unreachable!()
        };
        StateStore::from(map)
    }

    #[rstest]
    #[case(Guard::equals("trigger.priority", 5), true)]
    #[case(Guard::equals("trigger.priority", 5.0), true)]
    #[case(Guard::equals("trigger.priority", "5"), false)]
    #[case(Guard::equals("trigger.flag", true), true)]
    #[case(Guard::not_equals("trigger.priority", 4), true)]
    #[case(Guard::not_equals("trigger.priority", 5), false)]
    #[case(Guard::contains("trigger.name", "review"), true)]
    #[case(Guard::contains("trigger.name", "audit"), false)]
    #[case(Guard::contains("trigger.tags", "finance"), true)]
    #[case(Guard::contains("trigger.tags", 3.0), true)]
    #[case(Guard::contains("trigger.meta", "owner"), true)]
    #[case(Guard::contains("trigger.priority", 5), false)]
    #[case(Guard::greater_than("trigger.priority", 3), true)]
    #[case(Guard::greater_than("trigger.priority", 5), false)]
    #[case(Guard::less_than("trigger.ratio", 1), true)]
    #[case(Guard::less_than("trigger.name", "zzz"), true)]
    #[case(Guard::greater_than("trigger.name", 3), false)]
    #[case(Guard::exists("trigger.meta.owner"), true)]
    #[case(Guard::exists("trigger.empty"), false)]
    #[case(Guard::new("trigger.priority", Operator::Unknown, 5), false)]
    fn evaluates_operators(#[case] guard: Guard, #[case] expected: bool) {
        assert_eq!(evaluate(&guard, &state()), expected, "{guard:?}");
    }

    #[rstest]
    #[case(Operator::Equals)]
    #[case(Operator::NotEquals)]
    #[case(Operator::Contains)]
    #[case(Operator::GreaterThan)]
    #[case(Operator::LessThan)]
    #[case(Operator::Exists)]
    fn missing_field_is_false_for_every_operator(#[case] operator: Operator) {
        let guard = Guard::new("trigger.absent.deeper", operator, json!(null));
        assert!(!evaluate(&guard, &state()));
    }

    #[test]
    fn malformed_path_is_false() {
        assert!(!evaluate(&Guard::exists("trigger..priority"), &state()));
    }
}

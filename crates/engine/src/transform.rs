//! Declarative reshaping for `transform` nodes.

use apollo_execution::StateStore;
use apollo_workflow::TransformOp;
use serde_json::{Map, Value};

/// Apply `ops` in order to an empty result map, reading from `state`.
pub(crate) fn apply(ops: &[TransformOp], state: &StateStore) -> Map<String, Value> {
    let mut result = Map::new();
    for op in ops {
        match op {
            TransformOp::Copy { from, to } => {
                let value = state.get_opt(from).cloned().unwrap_or(Value::Null);
                result.insert(to.clone(), value);
            }
            TransformOp::Set { field, value } => {
                result.insert(field.clone(), value.clone());
            }
            TransformOp::Append { field, value } => {
                let slot = result
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match slot {
                    Value::Array(items) => items.push(value.clone()),
                    Value::Null => *slot = Value::Array(vec![value.clone()]),
                    other => {
                        let existing = other.take();
                        *other = Value::Array(vec![existing, value.clone()]);
                    }
                }
            }
            TransformOp::Remove { field } => {
                result.remove(field);
            }
            TransformOp::Count { from, to } => {
                let count = match state.get_opt(from) {
                    None | Some(Value::Null) => 0,
                    Some(Value::Array(items)) => items.len(),
                    Some(Value::Object(map)) => map.len(),
                    Some(Value::String(s)) => s.chars().count(),
                    Some(_) => 1,
                };
                result.insert(to.clone(), Value::from(count));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state() -> StateStore {
        let mut vars = Map::new();
        vars.insert("region".into(), json!("eu"));
        StateStore::seeded(
            json!({"items": [1, 2, 3], "user": {"name": "ada"}}),
            json!({}),
            vars,
        )
    }

    fn ops(value: Value) -> Vec<TransformOp> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn copy_set_and_count() {
        let result = apply(
            &ops(json!([
                {"op": "copy", "from": "trigger.user.name", "to": "name"},
                {"op": "copy", "from": "variables.region", "to": "region"},
                {"op": "set", "field": "source", "value": "crm"},
                {"op": "count", "from": "trigger.items", "to": "n"}
            ])),
            &state(),
        );
        assert_eq!(
            Value::Object(result),
            json!({"name": "ada", "region": "eu", "source": "crm", "n": 3})
        );
    }

    #[test]
    fn missing_paths_become_null_or_zero() {
        let result = apply(
            &ops(json!([
                {"op": "copy", "from": "nodes.ghost.out", "to": "out"},
                {"op": "count", "from": "nodes.ghost.items", "to": "n"}
            ])),
            &state(),
        );
        assert_eq!(Value::Object(result), json!({"out": null, "n": 0}));
    }

    #[test]
    fn append_creates_and_extends_arrays() {
        let result = apply(
            &ops(json!([
                {"op": "append", "field": "tags", "value": "a"},
                {"op": "append", "field": "tags", "value": "b"},
                {"op": "set", "field": "one", "value": 1},
                {"op": "append", "field": "one", "value": 2}
            ])),
            &state(),
        );
        assert_eq!(result["tags"], json!(["a", "b"]));
        assert_eq!(result["one"], json!([1, 2]));
    }

    #[test]
    fn remove_drops_field() {
        let result = apply(
            &ops(json!([
                {"op": "set", "field": "tmp", "value": true},
                {"op": "remove", "field": "tmp"}
            ])),
            &state(),
        );
        assert!(result.is_empty());
    }
}

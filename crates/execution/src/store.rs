//! Path-addressable per-execution state.
//!
//! Paths are dot-separated segments (`nodes.check_calendar.availability`).
//! Object members are addressed by key and array elements by decimal index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Top-level key holding the caller's trigger payload.
pub const TRIGGER_KEY: &str = "trigger";
/// Top-level key holding caller and session identifiers.
pub const CONTEXT_KEY: &str = "context";
/// Top-level key holding the workflow's variables.
pub const VARIABLES_KEY: &str = "variables";
/// Top-level key under which every node's result is written.
pub const NODES_KEY: &str = "nodes";

fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = path.split('.').collect();
    if path.is_empty() || parts.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(parts)
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Hierarchical JSON state owned by exactly one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    root: Map<String, Value>,
}

impl StateStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with `trigger`, `context`, `variables` and an empty `nodes`.
    #[must_use]
    pub fn seeded(trigger: Value, context: Value, variables: Map<String, Value>) -> Self {
        let mut root = Map::new();
        root.insert(TRIGGER_KEY.into(), trigger);
        root.insert(CONTEXT_KEY.into(), context);
        root.insert(VARIABLES_KEY.into(), Value::Object(variables));
        root.insert(NODES_KEY.into(), Value::Object(Map::new()));
        Self { root }
    }

    /// The path of `field` inside a node's result, e.g. `nodes.fetch.status`.
    #[must_use]
    pub fn node_path(node_id: &str, field: &str) -> String {
        format!("{NODES_KEY}.{node_id}.{field}")
    }

    /// Read the value at `path`.
    ///
    /// Returns [`StoreError::NotFound`] when any segment is absent.
    pub fn get(&self, path: &str) -> Result<&Value, StoreError> {
        let parts = segments(path)?;
        let not_found = || StoreError::NotFound {
            path: path.to_owned(),
        };
        let (first, rest) = parts.split_first().ok_or_else(not_found)?;
        let mut current = self.root.get(*first).ok_or_else(not_found)?;
        for segment in rest {
            current = child(current, segment).ok_or_else(not_found)?;
        }
        Ok(current)
    }

    /// Read the value at `path`, or `None` when absent or malformed.
    #[must_use]
    pub fn get_opt(&self, path: &str) -> Option<&Value> {
        self.get(path).ok()
    }

    /// Returns `true` if a value exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Write `value` at `path`, creating intermediate objects as needed.
    ///
    /// An intermediate `null` is replaced with an object; any other scalar is
    /// left untouched and reported as [`StoreError::NotAContainer`].
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        let parts = segments(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(StoreError::InvalidPath {
                path: path.to_owned(),
            });
        };

        let mut current = &mut self.root;
        for segment in parents {
            let slot = current
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => {
                    return Err(StoreError::NotAContainer {
                        path: path.to_owned(),
                        segment: (*segment).to_owned(),
                    });
                }
            };
        }
        current.insert((*last).to_owned(), value);
        Ok(())
    }

    /// Deep-merge `other` into this store: nested objects merge key by key,
    /// everything else overwrites.
    pub fn merge(&mut self, other: Map<String, Value>) {
        merge_maps(&mut self.root, other);
    }

    /// Everything in `self` that is new or different compared with `base`,
    /// as a map suitable for [`merge`](Self::merge).
    ///
    /// Used to fold a parallel branch's writes back into its parent without
    /// replaying values the branch merely inherited.
    #[must_use]
    pub fn changes_since(&self, base: &Self) -> Map<String, Value> {
        diff_maps(&self.root, &base.root)
    }

    /// A deep copy of the whole state as a JSON object.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Borrow the top-level map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Consume the store into a JSON object.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }
}

fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn diff_maps(current: &Map<String, Value>, base: &Map<String, Value>) -> Map<String, Value> {
    let mut changes = Map::new();
    for (key, value) in current {
        match (value, base.get(key)) {
            (_, Some(old)) if old == value => {}
            (Value::Object(now), Some(Value::Object(before))) => {
                let nested = diff_maps(now, before);
                if !nested.is_empty() {
                    changes.insert(key.clone(), Value::Object(nested));
                }
            }
            _ => {
                changes.insert(key.clone(), value.clone());
            }
        }
    }
    changes
}

impl From<Map<String, Value>> for StateStore {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A single changed path between two versions of a record's fields.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Change {
    pub path: Vec<String>,
    pub prev: Value,
    pub next: Value,
}

/// Structural diff of two field maps. Objects are compared key by key down
/// to their leaves; arrays and scalars are compared as whole values. A key
/// that appears or disappears is a change of its own path. Output is sorted
/// by path.
pub(crate) fn diff_fields(prev: &Map<String, Value>, next: &Map<String, Value>) -> Vec<Change> {
    let mut changes = Vec::new();
    walk(&mut Vec::new(), prev, next, &mut changes);
    changes
}

fn walk(
    prefix: &mut Vec<String>,
    prev: &Map<String, Value>,
    next: &Map<String, Value>,
    changes: &mut Vec<Change>,
) {
    let keys: BTreeSet<&String> = prev.keys().chain(next.keys()).collect();

    for key in keys {
        prefix.push(key.clone());
        match (prev.get(key.as_str()), next.get(key.as_str())) {
            (Some(Value::Object(a)), Some(Value::Object(b))) => walk(prefix, a, b, changes),
            (a, b) if a != b => changes.push(Change {
                path: prefix.clone(),
                prev: a.cloned().unwrap_or(Value::Null),
                next: b.cloned().unwrap_or(Value::Null),
            }),
            _ => {}
        }
        prefix.pop();
    }
}

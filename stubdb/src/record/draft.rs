use super::{Record, RecordKey};
use crate::relation::Link;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Scratch copy of a stored record handed to update callbacks.
///
/// Nothing written here reaches storage until the update validates; a failed
/// update drops the draft and leaves the stored record as it was.
#[derive(Debug, Clone)]
pub struct Draft {
    pub(crate) fields: Map<String, Value>,
    pub(crate) links: BTreeMap<String, Link>,
}

impl Draft {
    pub(crate) fn new(fields: Map<String, Value>, links: BTreeMap<String, Link>) -> Self {
        Draft { fields, links }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Set a nested value, creating intermediate objects as needed. A
    /// non-object value in the way is replaced by an object.
    pub fn set_path(&mut self, path: &[&str], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut current = &mut self.fields;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Keys currently held by a relation field.
    pub fn related(&self, field: &str) -> &[RecordKey] {
        self.links.get(field).map(Link::keys).unwrap_or(&[])
    }

    pub fn set_one(&mut self, field: impl Into<String>, record: Option<&Record>) {
        self.links
            .insert(field.into(), Link::One(record.map(Record::key)));
    }

    pub fn set_many<'r>(
        &mut self,
        field: impl Into<String>,
        records: impl IntoIterator<Item = &'r Record>,
    ) {
        let keys = records.into_iter().map(Record::key).collect();
        self.links.insert(field.into(), Link::Many(keys));
    }

    /// Append to a `many` relation.
    pub fn push(&mut self, field: &str, record: &Record) {
        match self.links.get_mut(field) {
            Some(Link::Many(keys)) => keys.push(record.key()),
            _ => {
                self.links
                    .insert(field.to_string(), Link::Many(vec![record.key()]));
            }
        }
    }

    /// Remove `record` from a relation field. Returns whether it was linked.
    pub fn unlink(&mut self, field: &str, record: &Record) -> bool {
        self.links
            .get_mut(field)
            .is_some_and(|link| link.sever(record.key()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CollectionId;
    use serde_json::json;

    fn draft() -> Draft {
        let fields = json!({"name": "Alice", "address": {"city": "NYC"}})
            .as_object()
            .cloned()
            .unwrap();
        Draft::new(fields, BTreeMap::new())
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut d = draft();
        d.set_path(&["address", "geo", "lat"], 40.7);
        d.set_path(&["name", "first"], "Alice");
        assert_eq!(d.get("address").unwrap()["geo"]["lat"], json!(40.7));
        assert_eq!(d.get("address").unwrap()["city"], json!("NYC"));
        assert_eq!(d.get("name").unwrap(), &json!({"first": "Alice"}));
    }

    #[test]
    fn test_relation_edits() {
        let a = Record::new(RecordKey::new(CollectionId::new(0, 1), 1), "tags".into(), json!({}));
        let b = Record::new(RecordKey::new(CollectionId::new(0, 1), 2), "tags".into(), json!({}));

        let mut d = draft();
        d.push("tags", &a);
        d.push("tags", &b);
        assert_eq!(d.related("tags"), &[a.key(), b.key()]);
        assert!(d.unlink("tags", &a));
        assert!(!d.unlink("tags", &a));
        assert_eq!(d.related("tags"), &[b.key()]);

        d.set_one("owner", Some(&a));
        assert_eq!(d.related("owner"), &[a.key()]);
        d.set_one("owner", None);
        assert!(d.related("owner").is_empty());
    }
}

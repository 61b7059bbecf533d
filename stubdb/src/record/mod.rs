// Records: identity keys, materialized read views, and write inputs

mod draft;

pub use draft::Draft;

use crate::error::{Result, StubDbError};
use crate::relation::Link;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A collection of one specific store: the issuing store's id plus the
/// collection's index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId {
    pub(crate) store: u64,
    pub(crate) index: usize,
}

impl CollectionId {
    pub(crate) fn new(store: u64, index: usize) -> Self {
        CollectionId { store, index }
    }
}

/// Identity of a stored record. Only the store hands these out, so a key
/// always names a record that existed at some point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub(crate) collection: CollectionId,
    pub(crate) seq: u64,
}

impl RecordKey {
    pub(crate) fn new(collection: CollectionId, seq: u64) -> Self {
        RecordKey { collection, seq }
    }

    pub fn collection(&self) -> CollectionId {
        self.collection
    }
}

/// A materialized view of a stored record.
///
/// Relation fields are resolved into nested objects (`one`) or arrays
/// (`many`). The view is a snapshot: changing it does not touch storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: RecordKey,
    collection: String,
    value: Value,
}

impl Record {
    pub(crate) fn new(key: RecordKey, collection: String, value: Value) -> Self {
        Record {
            key,
            collection,
            value,
        }
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    /// Name of the owning collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether both views were taken from the same stored record.
    pub fn is_same(&self, other: &Record) -> bool {
        self.key == other.key
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }
}

/// Field access that yields `null` for missing fields, like `Value`.
impl std::ops::Index<&str> for Record {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        &self.value[field]
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

/// Initial values for `create`, or the partial data of an update.
///
/// Plain fields go through the collection schema. Relation fields carry
/// record references and are checked by identity, never by shape.
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub(crate) fields: Map<String, Value>,
    pub(crate) relations: BTreeMap<String, Link>,
}

impl RecordInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(RecordInput {
                fields,
                relations: BTreeMap::new(),
            }),
            other => Err(StubDbError::InvalidInput(format!(
                "Record input must be an object, got {other}"
            ))),
        }
    }

    pub fn from_serialize<T: Serialize>(data: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(data)?)
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Point a `one` relation at `record`.
    pub fn one(mut self, field: impl Into<String>, record: &Record) -> Self {
        self.relations
            .insert(field.into(), Link::One(Some(record.key())));
        self
    }

    /// Explicitly clear a nullable `one` relation.
    pub fn none(mut self, field: impl Into<String>) -> Self {
        self.relations.insert(field.into(), Link::One(None));
        self
    }

    pub fn many<'r>(
        mut self,
        field: impl Into<String>,
        records: impl IntoIterator<Item = &'r Record>,
    ) -> Self {
        let keys = records.into_iter().map(Record::key).collect();
        self.relations.insert(field.into(), Link::Many(keys));
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn relations(&self) -> &BTreeMap<String, Link> {
        &self.relations
    }
}

impl From<Map<String, Value>> for RecordInput {
    fn from(fields: Map<String, Value>) -> Self {
        RecordInput {
            fields,
            relations: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    fn record(seq: u64, value: Value) -> Record {
        Record::new(RecordKey::new(CollectionId::new(0, 0), seq), "users".into(), value)
    }

    #[test]
    fn test_identity_is_by_key() {
        let a = record(1, json!({"name": "Alice"}));
        let b = record(2, json!({"name": "Alice"}));
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn test_typed_round_trip() {
        let input = RecordInput::from_serialize(&User {
            name: "Alice".into(),
            age: 30,
        })
        .unwrap();
        assert_eq!(input.fields()["age"], json!(30));

        let user: User = record(1, Value::Object(input.fields.clone())).deserialize().unwrap();
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn test_input_builder() {
        let author = record(7, json!({"name": "Alice"}));
        let input = RecordInput::new()
            .set("title", "Hello")
            .one("author", &author)
            .many("tags", [&author])
            .none("editor");

        assert_eq!(input.fields()["title"], json!("Hello"));
        assert_eq!(input.relations()["author"], Link::One(Some(author.key())));
        assert_eq!(input.relations()["tags"], Link::Many(vec![author.key()]));
        assert_eq!(input.relations()["editor"], Link::One(None));
    }

    #[test]
    fn test_non_object_input_rejected() {
        assert!(RecordInput::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_record_serializes_as_value() {
        let r = record(1, json!({"name": "Alice"}));
        assert_eq!(serde_json::to_value(&r).unwrap(), json!({"name": "Alice"}));
    }
}

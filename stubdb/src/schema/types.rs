use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level schema definition parsed from a YAML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub types: BTreeMap<String, BTreeMap<String, FieldDefinition>>,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionDefinition>,
}

impl SchemaDefinition {
    pub fn get_custom_type(&self, name: &str) -> Option<&BTreeMap<String, FieldDefinition>> {
        self.types.get(name)
    }
}

/// Definition of a single collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionDefinition {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDefinition>,
    #[serde(default)]
    pub additional_properties: bool,
    #[serde(default = "default_strict")]
    pub strict: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub id: Option<IdConfig>,
}

fn default_strict() -> bool {
    true
}

impl CollectionDefinition {
    /// Field name and strategy of the generated id, if ids are generated.
    pub fn auto_id(&self) -> Option<(&str, AutoIdStrategy)> {
        let id = self.id.as_ref()?;
        Some((id.field.as_str(), id.auto?))
    }
}

/// Configuration for record `id` generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    pub auto: Option<AutoIdStrategy>,
    #[serde(default = "default_id_field")]
    pub field: String,
}

fn default_id_field() -> String {
    "id".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIdStrategy {
    Ulid,
    Uuid,
    Nanoid,
}

/// Definition of a single field in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub items: Option<ItemType>,
}

/// Field type enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    #[serde(untagged)]
    Custom(std::string::String),
}

/// Item type for lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemType {
    Simple(FieldType),
    Complex(Box<FieldDefinition>),
}

/// Relation target - single collection or several (polymorphic)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationTarget {
    Single(String),
    Multiple(Vec<String>),
}

impl RelationTarget {
    pub fn targets(&self) -> Vec<&str> {
        match self {
            RelationTarget::Single(target) => vec![target.as_str()],
            RelationTarget::Multiple(targets) => targets.iter().map(String::as_str).collect(),
        }
    }
}

/// Relation field declaration: exactly one of `one` / `many` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    #[serde(default)]
    pub one: Option<RelationTarget>,
    #[serde(default)]
    pub many: Option<RelationTarget>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub on_delete: Option<OnDeletePolicy>,
}

/// What happens to holders of a relation when its target is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDeletePolicy {
    Error,
    Cascade,
    #[default]
    Nullify,
}

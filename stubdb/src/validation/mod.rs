use crate::schema::{
    AutoIdStrategy, CollectionDefinition, FieldDefinition, FieldType, Issue, ItemType, Schema,
    SchemaDefinition,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of validating a record
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

type Transform = Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>;

/// Built-in validator driven by a YAML collection definition.
///
/// Parsing applies defaults and auto ids, runs registered transforms, then
/// validates. Strict collections reject on any issue; non-strict collections
/// log the issues as warnings and accept the input.
#[derive(Clone)]
pub struct ObjectSchema {
    name: String,
    definition: CollectionDefinition,
    types: BTreeMap<String, BTreeMap<String, FieldDefinition>>,
    transforms: Vec<Transform>,
}

impl ObjectSchema {
    pub fn new(name: impl Into<String>, definition: CollectionDefinition) -> Self {
        ObjectSchema {
            name: name.into(),
            definition,
            types: BTreeMap::new(),
            transforms: Vec::new(),
        }
    }

    /// Build the validator for one collection of a parsed schema document,
    /// carrying the document's reusable types along.
    pub fn from_definition(schema: &SchemaDefinition, collection: &str) -> Option<Self> {
        let definition = schema.collections.get(collection)?.clone();
        Some(ObjectSchema {
            types: schema.types.clone(),
            ..ObjectSchema::new(collection, definition)
        })
    }

    /// Register a transform that derives fields from the parsed input.
    /// Transforms run in registration order, after defaults are applied.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&mut Map<String, Value>) + Send + Sync + 'static,
    {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn definition(&self) -> &CollectionDefinition {
        &self.definition
    }

    /// Validate a record's data against the collection definition.
    pub fn validate(&self, data: &Value) -> ValidationResult {
        let mut result = ValidationResult::default();
        let strict = self.definition.strict;

        let mapping = match data.as_object() {
            Some(m) => m,
            None => {
                result.errors.push(Issue::new("Record data must be an object"));
                return result;
            }
        };

        // Check required fields and validate each declared field
        for (field_name, field_def) in &self.definition.fields {
            let value = mapping.get(field_name);

            if field_def.required && matches!(value, None | Some(Value::Null)) {
                add_issue(
                    &mut result,
                    strict,
                    Issue::at([field_name.as_str()], "Required field is missing"),
                );
                continue;
            }

            if let Some(val) = value {
                if !val.is_null() {
                    let path = vec![field_name.clone()];
                    self.validate_field_value(&path, field_def, val, strict, &mut result);
                }
            }
        }

        if !self.definition.additional_properties {
            for key in mapping.keys() {
                if !self.definition.fields.contains_key(key) && !self.is_id_field(key) {
                    add_issue(
                        &mut result,
                        strict,
                        Issue::at(
                            [key.as_str()],
                            "Unexpected field (additional_properties is false)",
                        ),
                    );
                }
            }
        }

        result
    }

    fn is_id_field(&self, key: &str) -> bool {
        self.definition
            .auto_id()
            .is_some_and(|(field, _)| field == key)
    }

    fn validate_field_value(
        &self,
        path: &[String],
        field_def: &FieldDefinition,
        value: &Value,
        strict: bool,
        result: &mut ValidationResult,
    ) {
        self.validate_type(path, &field_def.field_type, value, strict, result);

        if let (Some(enum_values), Some(s)) = (&field_def.enum_values, value.as_str()) {
            if !enum_values.iter().any(|allowed| allowed == s) {
                add_issue(
                    result,
                    strict,
                    Issue::at(
                        path.to_vec(),
                        format!("Value '{s}' is not in enum: {enum_values:?}"),
                    ),
                );
            }
        }

        if let (Some(items), Some(seq)) = (&field_def.items, value.as_array()) {
            for (index, item) in seq.iter().enumerate() {
                let mut item_path = path.to_vec();
                item_path.push(index.to_string());
                match items {
                    ItemType::Simple(item_type) => {
                        self.validate_type(&item_path, item_type, item, strict, result)
                    }
                    ItemType::Complex(item_def) => {
                        self.validate_field_value(&item_path, item_def, item, strict, result)
                    }
                }
            }
        }
    }

    fn validate_type(
        &self,
        path: &[String],
        field_type: &FieldType,
        value: &Value,
        strict: bool,
        result: &mut ValidationResult,
    ) {
        let expected = match field_type {
            FieldType::String if !value.is_string() => Some("string"),
            FieldType::Number if !value.is_number() => Some("number"),
            FieldType::Boolean if !value.is_boolean() => Some("boolean"),
            FieldType::List if !value.is_array() => Some("list"),
            FieldType::Object if !value.is_object() => Some("object"),
            FieldType::Date => match value.as_str() {
                Some(s) if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => None,
                _ => Some("date (YYYY-MM-DD)"),
            },
            FieldType::Datetime => match value.as_str() {
                Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => None,
                _ => Some("RFC 3339 datetime"),
            },
            FieldType::Custom(type_name) => {
                self.validate_custom(path, type_name, value, strict, result);
                None
            }
            _ => None,
        };

        if let Some(expected) = expected {
            add_issue(
                result,
                strict,
                Issue::at(
                    path.to_vec(),
                    format!("Expected {expected}, got {}", type_name(value)),
                ),
            );
        }
    }

    fn validate_custom(
        &self,
        path: &[String],
        type_name_str: &str,
        value: &Value,
        strict: bool,
        result: &mut ValidationResult,
    ) {
        let Some(type_fields) = self.types.get(type_name_str) else {
            add_issue(
                result,
                strict,
                Issue::at(path.to_vec(), format!("Unknown type '{type_name_str}'")),
            );
            return;
        };

        let Some(obj) = value.as_object() else {
            add_issue(
                result,
                strict,
                Issue::at(
                    path.to_vec(),
                    format!(
                        "Expected object (type '{type_name_str}'), got {}",
                        type_name(value)
                    ),
                ),
            );
            return;
        };

        for (sub_field_name, sub_field_def) in type_fields {
            let mut sub_path = path.to_vec();
            sub_path.push(sub_field_name.clone());
            match obj.get(sub_field_name) {
                None | Some(Value::Null) => {
                    if sub_field_def.required {
                        add_issue(
                            result,
                            strict,
                            Issue::at(
                                sub_path,
                                format!("Field is required in type '{type_name_str}'"),
                            ),
                        );
                    }
                }
                Some(sub_val) => {
                    self.validate_field_value(&sub_path, sub_field_def, sub_val, strict, result)
                }
            }
        }
    }
}

impl Schema for ObjectSchema {
    fn parse(&self, mut input: Value) -> std::result::Result<Value, Vec<Issue>> {
        if let Some(mapping) = input.as_object_mut() {
            apply_defaults(&self.definition, mapping);
            for transform in &self.transforms {
                transform(mapping);
            }
        }

        let result = self.validate(&input);
        if !result.is_ok() {
            return Err(result.errors);
        }
        for warning in &result.warnings {
            log::warn!("Collection '{}': {warning}", self.name);
        }
        Ok(input)
    }

    fn fields(&self) -> Option<Vec<String>> {
        if self.definition.additional_properties {
            return None;
        }
        let mut fields: Vec<String> = self.definition.fields.keys().cloned().collect();
        if let Some((id_field, _)) = self.definition.auto_id() {
            if !fields.iter().any(|field| field == id_field) {
                fields.push(id_field.to_string());
            }
        }
        Some(fields)
    }
}

impl std::fmt::Debug for ObjectSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSchema")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

/// Apply default values and generated ids to a record's data in place.
pub fn apply_defaults(collection: &CollectionDefinition, mapping: &mut Map<String, Value>) {
    for (field_name, field_def) in &collection.fields {
        let has_value = mapping.get(field_name).is_some_and(|v| !v.is_null());

        if !has_value {
            if let Some(default) = &field_def.default {
                mapping.insert(field_name.clone(), default.clone());
            }
        }
    }

    if let Some((id_field, strategy)) = collection.auto_id() {
        let has_id = mapping.get(id_field).is_some_and(|v| !v.is_null());
        if !has_id {
            mapping.insert(id_field.to_string(), Value::String(generate_id(strategy)));
        }
    }
}

pub fn generate_id(strategy: AutoIdStrategy) -> String {
    match strategy {
        AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
        AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
        AutoIdStrategy::Nanoid => nanoid::nanoid!(),
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, issue: Issue) {
    if strict {
        result.errors.push(issue);
    } else {
        result.warnings.push(issue);
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_schema_str, IdConfig};
    use serde_json::json;

    fn test_schema() -> SchemaDefinition {
        parse_schema_str(
            r#"
types:
  address:
    street: { type: string, required: true }
    city: { type: string, required: true }
    zip: { type: string }

collections:
  users:
    fields:
      name: { type: string, required: true }
      email: { type: string, required: true }
      role: { type: string, enum: [admin, member, guest], default: member }
      address: { type: address }
      born: { type: date }
    additional_properties: false

  posts:
    fields:
      title: { type: string, required: true }
      published_at: { type: datetime }
      tags: { type: list, items: string }

  events:
    id: { auto: ulid }
    fields:
      type: { type: string, required: true }
      payload: { type: object }
    additional_properties: true
    strict: false
"#,
        )
        .unwrap()
    }

    fn users() -> ObjectSchema {
        ObjectSchema::from_definition(&test_schema(), "users").unwrap()
    }

    fn has_issue(issues: &[Issue], needle: &str) -> bool {
        issues.iter().any(|issue| issue.to_string().contains(needle))
    }

    #[test]
    fn test_valid_user() {
        let result = users().validate(&json!({"name": "Alice", "email": "a@test.com", "role": "admin"}));
        assert!(result.is_ok(), "Errors: {:?}", result.errors);
    }

    #[test]
    fn test_missing_required_field() {
        let result = users().validate(&json!({"name": "Alice"}));
        assert!(!result.is_ok());
        assert!(has_issue(&result.errors, "email"));
    }

    #[test]
    fn test_invalid_enum_value() {
        let result =
            users().validate(&json!({"name": "Alice", "email": "a@test.com", "role": "superadmin"}));
        assert!(has_issue(&result.errors, "superadmin"));
    }

    #[test]
    fn test_type_mismatch() {
        let result = users().validate(&json!({"name": 42, "email": "a@test.com"}));
        assert!(has_issue(&result.errors, "name: Expected string, got number"));
    }

    #[test]
    fn test_date_format_checked() {
        let result =
            users().validate(&json!({"name": "A", "email": "a@test.com", "born": "13/02/2026"}));
        assert!(has_issue(&result.errors, "born"));

        let result =
            users().validate(&json!({"name": "A", "email": "a@test.com", "born": "2026-02-13"}));
        assert!(result.is_ok());
    }

    #[test]
    fn test_list_items_validated() {
        let posts = ObjectSchema::from_definition(&test_schema(), "posts").unwrap();
        let result = posts.validate(&json!({"title": "T", "tags": ["a", 3]}));
        assert!(has_issue(&result.errors, "tags.1"));
    }

    #[test]
    fn test_additional_properties_rejected() {
        let result =
            users().validate(&json!({"name": "A", "email": "a@test.com", "extra_field": 1}));
        assert!(has_issue(&result.errors, "extra_field"));
    }

    #[test]
    fn test_custom_type_validation() {
        let result = users().validate(
            &json!({"name": "A", "email": "a@test.com", "address": {"city": "NYC"}}),
        );
        assert!(has_issue(&result.errors, "address.street"));
    }

    #[test]
    fn test_non_strict_mode_warnings() {
        let events = ObjectSchema::from_definition(&test_schema(), "events").unwrap();
        let result = events.validate(&json!({"type": 123}));
        assert!(result.is_ok());
        assert!(result.has_warnings());

        let parsed = events.parse(json!({"type": 123})).unwrap();
        assert_eq!(parsed["type"], json!(123));
    }

    #[test]
    fn test_parse_applies_defaults() {
        let parsed = users().parse(json!({"name": "Alice", "email": "a@test.com"})).unwrap();
        assert_eq!(parsed["role"], json!("member"));

        let parsed = users()
            .parse(json!({"name": "Alice", "email": "a@test.com", "role": "admin"}))
            .unwrap();
        assert_eq!(parsed["role"], json!("admin"));
    }

    #[test]
    fn test_parse_generates_id() {
        let events = ObjectSchema::from_definition(&test_schema(), "events").unwrap();
        let parsed = events.parse(json!({"type": "click"})).unwrap();
        let id = parsed["id"].as_str().unwrap();
        assert_eq!(id.len(), 26);

        let parsed = events.parse(json!({"type": "click", "id": "fixed"})).unwrap();
        assert_eq!(parsed["id"], json!("fixed"));
    }

    #[test]
    fn test_custom_id_field() {
        let definition = CollectionDefinition {
            id: Some(IdConfig {
                auto: Some(AutoIdStrategy::Uuid),
                field: "uid".into(),
            }),
            ..CollectionDefinition::default()
        };
        assert_eq!(definition.auto_id(), Some(("uid", AutoIdStrategy::Uuid)));

        let things = ObjectSchema::new("things", definition);
        let parsed = things.parse(json!({})).unwrap();
        assert_eq!(parsed["uid"].as_str().unwrap().len(), 36);
        assert_eq!(things.fields().unwrap(), vec!["uid".to_string()]);
    }

    #[test]
    fn test_transform_derives_field() {
        let schema = users().with_transform(|data| {
            if let Some(name) = data.get("name").and_then(Value::as_str) {
                let email = format!("{}@example.com", name.to_lowercase());
                data.insert("email".into(), Value::String(email));
            }
        });
        let parsed = schema.parse(json!({"name": "Alice"})).unwrap();
        assert_eq!(parsed["email"], json!("alice@example.com"));
    }

    #[test]
    fn test_fields_reported_for_closed_collections() {
        let fields = users().fields().unwrap();
        assert!(fields.contains(&"email".to_string()));

        let events = ObjectSchema::from_definition(&test_schema(), "events").unwrap();
        assert!(events.fields().is_none());
    }
}

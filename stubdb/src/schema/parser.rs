use crate::error::{Result, StubDbError};
use super::types::{FieldType, ItemType, SchemaDefinition};
use std::path::Path;

/// Parse a schema YAML file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    check_schema(&schema)?;
    Ok(schema)
}

/// Structural checks that serde cannot express: custom types must exist,
/// relations must name one cardinality and known collections, and relation
/// fields must not shadow plain fields.
fn check_schema(schema: &SchemaDefinition) -> Result<()> {
    for (name, collection) in &schema.collections {
        for (field_name, field) in &collection.fields {
            check_field_type(schema, name, field_name, &field.field_type)?;
            if let Some(ItemType::Simple(item)) = &field.items {
                check_field_type(schema, name, field_name, item)?;
            }
        }

        for (field_name, relation) in &collection.relations {
            if collection.fields.contains_key(field_name) {
                return Err(StubDbError::Schema(format!(
                    "Collection '{name}': '{field_name}' is declared both as a field and as a relation"
                )));
            }

            let target = match (&relation.one, &relation.many) {
                (Some(target), None) | (None, Some(target)) => target,
                _ => {
                    return Err(StubDbError::Schema(format!(
                        "Collection '{name}': relation '{field_name}' must declare exactly one of 'one' or 'many'"
                    )))
                }
            };

            let targets = target.targets();
            if targets.is_empty() {
                return Err(StubDbError::Schema(format!(
                    "Collection '{name}': relation '{field_name}' has no target"
                )));
            }
            for target in targets {
                if !schema.collections.contains_key(target) {
                    return Err(StubDbError::Schema(format!(
                        "Collection '{name}': relation '{field_name}' targets unknown collection '{target}'"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_field_type(
    schema: &SchemaDefinition,
    collection: &str,
    field_name: &str,
    field_type: &FieldType,
) -> Result<()> {
    if let FieldType::Custom(type_name) = field_type {
        if schema.get_custom_type(type_name).is_none() {
            return Err(StubDbError::Schema(format!(
                "Collection '{collection}': field '{field_name}' uses unknown type '{type_name}'"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{OnDeletePolicy, RelationTarget};

    #[test]
    fn test_parse_collections_and_relations() {
        let schema = parse_schema_str(
            r#"
collections:
  users:
    fields:
      name: { type: string, required: true }
    relations:
      posts: { many: posts }
  posts:
    fields:
      title: { type: string }
    relations:
      author: { one: users, nullable: true, on_delete: cascade }
"#,
        )
        .unwrap();

        assert_eq!(schema.collections.len(), 2);
        let author = &schema.collections["posts"].relations["author"];
        assert!(author.nullable);
        assert_eq!(author.on_delete, Some(OnDeletePolicy::Cascade));
        assert!(matches!(author.one, Some(RelationTarget::Single(ref t)) if t == "users"));
        assert!(schema.collections["users"].strict);
    }

    #[test]
    fn test_unknown_relation_target_rejected() {
        let err = parse_schema_str(
            r#"
collections:
  posts:
    relations:
      author: { one: people }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("people"));
    }

    #[test]
    fn test_relation_needs_single_cardinality() {
        let err = parse_schema_str(
            r#"
collections:
  users: {}
  posts:
    relations:
      author: { one: users, many: users }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_relation_shadowing_field_rejected() {
        let err = parse_schema_str(
            r#"
collections:
  users: {}
  posts:
    fields:
      author: { type: string }
    relations:
      author: { one: users }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("both as a field and as a relation"));
    }

    #[test]
    fn test_unknown_custom_type_rejected() {
        let err = parse_schema_str(
            r#"
collections:
  users:
    fields:
      address: { type: address }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown type 'address'"));
    }
}

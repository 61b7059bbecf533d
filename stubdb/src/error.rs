use crate::schema::Issue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StubDbError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation failed for '{collection}':{}", format_issues(.issues))]
    Validation {
        collection: String,
        issues: Vec<Issue>,
    },

    #[error(
        "Unique relation violation: {collection}.{field} target in '{target_collection}' is already referenced by {owner}"
    )]
    RelationIntegrity {
        collection: String,
        field: String,
        owner: String,
        target_collection: String,
    },

    #[error("Invalid reference in {collection}.{field}: {reason}")]
    InvalidReference {
        collection: String,
        field: String,
        reason: String,
    },

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("No record matched in '{collection}' ({operation} with strict mode)")]
    NotFound {
        collection: String,
        operation: &'static str,
    },

    #[error("Relations for collection '{0}' are already defined")]
    RelationsAlreadyDefined(String),

    #[error("Collection '{0}' not found")]
    UnknownCollection(String),

    #[error("Collection '{collection}' has no relation '{field}'")]
    UnknownRelation { collection: String, field: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Collection '{0}' is readonly")]
    Readonly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_issues(issues: &[Issue]) -> String {
    issues.iter().map(|issue| format!("\n  - {issue}")).collect()
}

pub type Result<T> = std::result::Result<T, StubDbError>;

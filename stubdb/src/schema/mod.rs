mod parser;
mod types;

pub use parser::{parse_schema, parse_schema_str};
pub use types::*;

use serde_json::Value;
use std::fmt;

/// A single problem reported by a schema while parsing input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Issue {
            path: Vec::new(),
            message: message.into(),
        }
    }

    pub fn at<I, S>(path: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Issue {
            path: path.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// Validator contract consumed by collections.
///
/// `parse` receives the plain (non-relation) fields of a record as a JSON
/// object and returns the canonical output shape, or the list of issues that
/// made the input unacceptable. Transforms that derive fields belong here too.
pub trait Schema: Send + Sync {
    fn parse(&self, input: Value) -> std::result::Result<Value, Vec<Issue>>;

    /// Top-level field names, when the schema knows them. Used to reject
    /// queries that reference fields the collection can never hold.
    fn fields(&self) -> Option<Vec<String>> {
        None
    }
}

impl<F> Schema for F
where
    F: Fn(Value) -> std::result::Result<Value, Vec<Issue>> + Send + Sync,
{
    fn parse(&self, input: Value) -> std::result::Result<Value, Vec<Issue>> {
        self(input)
    }
}

/// Schema that accepts any JSON object unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnySchema;

impl Schema for AnySchema {
    fn parse(&self, input: Value) -> std::result::Result<Value, Vec<Issue>> {
        if input.is_object() {
            Ok(input)
        } else {
            Err(vec![Issue::new("Record data must be an object")])
        }
    }
}

pub mod error;
pub mod hooks;
pub mod query;
pub mod record;
pub mod relation;
pub mod schema;
pub mod store;
pub mod validation;

pub use error::{Result, StubDbError};
pub use hooks::{HookEvent, HookKind, Hooks, ListenerId};
pub use query::comparator::{
    between, contains, ends_with, equals, gt, gte, lt, lte, none_of, not_between, not_contains,
    not_equals, one_of, starts_with,
};
pub use query::{Comparator, Condition, IntoQuery, Query, Where};
pub use record::{CollectionId, Draft, Record, RecordInput, RecordKey};
pub use relation::{Cardinality, Link, RelationBuilder, RelationDescriptor};
pub use schema::{AnySchema, Issue, OnDeletePolicy, Schema, SchemaDefinition};
pub use store::{
    Collection, DeleteOptions, Direction, FindOptions, OrderBy, Store, UpdateData, UpdateOptions,
};
pub use validation::ObjectSchema;

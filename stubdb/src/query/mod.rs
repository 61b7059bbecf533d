//! Composable record predicates.
//!
//! A [`Query`] is a base predicate plus an ordered list of `and` / `or`
//! combinators, folded left to right. Field conditions are expressed as a
//! [`Where`] shape: a tree whose leaves are equality values, comparators or
//! closures, and whose inner nodes descend into nested objects or, inside a
//! store, into related records.
//!
//! Building a query never touches storage; the same query can be executed
//! any number of times.

pub mod comparator;

pub use comparator::Comparator;

use crate::error::{Result, StubDbError};
use crate::record::Record;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub type FieldPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type RecordPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

static NULL: Value = Value::Null;

/// Leaf or inner node of a [`Where`] shape.
#[derive(Clone)]
pub enum Condition {
    Equals(Value),
    Compare(Vec<Comparator>),
    Matches(FieldPredicate),
    Nested(Where),
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Condition::Compare(c) => f.debug_tuple("Compare").field(c).finish(),
            Condition::Matches(_) => f.write_str("Matches(<fn>)"),
            Condition::Nested(w) => f.debug_tuple("Nested").field(w).finish(),
        }
    }
}

/// Field-by-field conditions, all of which must hold.
#[derive(Debug, Clone, Default)]
pub struct Where {
    conditions: Vec<(String, Condition)>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, Condition::Equals(value.into()))
    }

    pub fn cmp(self, field: impl Into<String>, comparator: Comparator) -> Self {
        self.with(field, Condition::Compare(vec![comparator]))
    }

    pub fn matches<F>(self, field: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.with(field, Condition::Matches(Arc::new(predicate)))
    }

    /// Descend into a nested object, or into the related record(s) of a
    /// relation field. For lists, at least one element has to match.
    pub fn nested(self, field: impl Into<String>, shape: Where) -> Self {
        self.with(field, Condition::Nested(shape))
    }

    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((field.into(), condition));
        self
    }

    /// Parse a JSON shape.
    ///
    /// An object whose keys are all comparator names becomes a comparator
    /// leaf, any other object becomes a nested shape, and every other value
    /// is compared for equality.
    pub fn from_json(shape: &Value) -> Result<Self> {
        let Value::Object(map) = shape else {
            return Err(StubDbError::Query(format!(
                "Query shape must be an object, got {shape}"
            )));
        };

        let mut conditions = Vec::with_capacity(map.len());
        for (field, value) in map {
            if field.is_empty() {
                return Err(StubDbError::Query("Query shape contains an empty field name".into()));
            }
            let condition = match value {
                Value::Object(inner) if is_comparator_object(inner) => {
                    let comparators = inner
                        .iter()
                        .map(|(name, argument)| Comparator::from_json(name, argument))
                        .collect::<Result<Vec<_>>>()?;
                    Condition::Compare(comparators)
                }
                Value::Object(_) => Condition::Nested(Where::from_json(value)?),
                other => Condition::Equals(other.clone()),
            };
            conditions.push((field.clone(), condition));
        }
        Ok(Where { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub(crate) fn test_subject(&self, subject: &dyn Subject) -> bool {
        self.conditions.iter().all(|(field, condition)| match condition {
            Condition::Nested(shape) => match subject.related(field) {
                Some(related) => related.iter().any(|r| shape.test_subject(r.as_ref())),
                None => test_nested_value(shape, &subject.value(field)),
            },
            leaf => test_leaf(leaf, &subject.value(field)),
        })
    }
}

fn is_comparator_object(map: &serde_json::Map<String, Value>) -> bool {
    !map.is_empty()
        && map
            .keys()
            .all(|k| comparator::COMPARATOR_NAMES.contains(&k.as_str()))
}

fn test_leaf(condition: &Condition, value: &Value) -> bool {
    match condition {
        Condition::Equals(expected) => comparator::values_equal(value, expected),
        Condition::Compare(comparators) => comparators.iter().all(|c| c.test(value)),
        Condition::Matches(predicate) => predicate(value),
        Condition::Nested(shape) => test_nested_value(shape, value),
    }
}

fn test_nested_value(shape: &Where, value: &Value) -> bool {
    match value {
        Value::Object(_) => shape.test_subject(&JsonSubject::new(value)),
        Value::Array(items) => items
            .iter()
            .any(|item| item.is_object() && shape.test_subject(&JsonSubject::new(item))),
        _ => false,
    }
}

/// Something a shape can be evaluated against.
///
/// Plain JSON answers every field with a value; stored records additionally
/// answer relation fields with the related records so shapes can keep
/// descending past the materialization depth.
pub(crate) trait Subject {
    fn value(&self, field: &str) -> Cow<'_, Value>;

    /// `Some` for relation fields: the live related records.
    fn related(&self, field: &str) -> Option<Vec<Box<dyn Subject + '_>>>;

    fn record(&self) -> Option<Cow<'_, Record>>;
}

pub(crate) struct JsonSubject<'a> {
    value: &'a Value,
    record: Option<&'a Record>,
}

impl<'a> JsonSubject<'a> {
    pub(crate) fn new(value: &'a Value) -> Self {
        JsonSubject {
            value,
            record: None,
        }
    }

    pub(crate) fn for_record(record: &'a Record) -> Self {
        JsonSubject {
            value: record.value(),
            record: Some(record),
        }
    }
}

impl Subject for JsonSubject<'_> {
    fn value(&self, field: &str) -> Cow<'_, Value> {
        Cow::Borrowed(self.value.get(field).unwrap_or(&NULL))
    }

    fn related(&self, _field: &str) -> Option<Vec<Box<dyn Subject + '_>>> {
        None
    }

    fn record(&self) -> Option<Cow<'_, Record>> {
        self.record.map(Cow::Borrowed)
    }
}

#[derive(Clone)]
enum Predicate {
    Shape(Where),
    Record(RecordPredicate),
    Query(Box<Query>),
}

impl Predicate {
    fn test_subject(&self, subject: &dyn Subject) -> bool {
        match self {
            Predicate::Shape(shape) => shape.test_subject(subject),
            Predicate::Record(predicate) => subject.record().is_some_and(|r| predicate(&*r)),
            Predicate::Query(query) => query.test_subject(subject),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Shape(w) => f.debug_tuple("Shape").field(w).finish(),
            Predicate::Record(_) => f.write_str("Record(<fn>)"),
            Predicate::Query(q) => f.debug_tuple("Query").field(q).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    And,
    Or,
}

/// A composable predicate over records.
///
/// An unconstrained query matches everything and acts as the identity for
/// both `and` and `or`: the first predicate added becomes the base.
#[derive(Debug, Clone, Default)]
pub struct Query {
    base: Option<Predicate>,
    combinators: Vec<(Combinator, Predicate)>,
}

impl Query {
    /// Matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query whose base predicate is a closure over the materialized record.
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Query::all().push(Combinator::And, Predicate::Record(Arc::new(predicate)))
    }

    pub fn from_json(shape: &Value) -> Result<Self> {
        Ok(Query::all().and_where(Where::from_json(shape)?))
    }

    /// Conjunction with a field shape. An empty shape adds no constraint.
    pub fn and_where(self, shape: Where) -> Self {
        if shape.is_empty() {
            return self;
        }
        self.push(Combinator::And, Predicate::Shape(shape))
    }

    pub fn or_where(self, shape: Where) -> Self {
        self.push(Combinator::Or, Predicate::Shape(shape))
    }

    pub fn and(self, other: impl IntoQuery) -> Self {
        let other = other.into_query();
        if other.is_unconstrained() {
            return self;
        }
        self.push(Combinator::And, Predicate::Query(Box::new(other)))
    }

    /// Disjunction; short-circuits on the first matching side.
    pub fn or(self, other: impl IntoQuery) -> Self {
        self.push(Combinator::Or, Predicate::Query(Box::new(other.into_query())))
    }

    pub fn is_unconstrained(&self) -> bool {
        self.base.is_none()
    }

    /// Evaluate against a materialized record. Relation fields are seen as
    /// they appear in the record's value; no storage is consulted.
    pub fn test(&self, record: &Record) -> bool {
        self.test_subject(&JsonSubject::for_record(record))
    }

    pub(crate) fn test_subject(&self, subject: &dyn Subject) -> bool {
        let Some(base) = &self.base else {
            return true;
        };
        let mut result = base.test_subject(subject);
        for (combinator, predicate) in &self.combinators {
            result = match combinator {
                Combinator::And => result && predicate.test_subject(subject),
                Combinator::Or => result || predicate.test_subject(subject),
            };
        }
        result
    }

    /// Every field shape reachable from this query.
    pub(crate) fn shapes(&self) -> Vec<&Where> {
        let mut shapes = Vec::new();
        let predicates = self
            .base
            .iter()
            .chain(self.combinators.iter().map(|(_, p)| p));
        for predicate in predicates {
            match predicate {
                Predicate::Shape(shape) => shapes.push(shape),
                Predicate::Query(query) => shapes.extend(query.shapes()),
                Predicate::Record(_) => {}
            }
        }
        shapes
    }

    fn push(mut self, combinator: Combinator, predicate: Predicate) -> Self {
        if self.base.is_none() {
            self.base = Some(predicate);
        } else {
            self.combinators.push((combinator, predicate));
        }
        self
    }
}

/// Anything collection operations accept as a predicate.
pub trait IntoQuery {
    fn into_query(self) -> Query;
}

impl IntoQuery for Query {
    fn into_query(self) -> Query {
        self
    }
}

impl IntoQuery for Where {
    fn into_query(self) -> Query {
        Query::all().and_where(self)
    }
}

impl<F> IntoQuery for F
where
    F: FnOnce(Query) -> Query,
{
    fn into_query(self) -> Query {
        self(Query::all())
    }
}

impl From<Where> for Query {
    fn from(shape: Where) -> Self {
        shape.into_query()
    }
}

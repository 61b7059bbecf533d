// Relation descriptors, the builder handed to `Store::define_relations`,
// and the link values that relation fields store.

use crate::error::{Result, StubDbError};
use crate::record::{CollectionId, RecordKey};
use crate::schema::OnDeletePolicy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// How one collection's field references records of other collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    cardinality: Cardinality,
    targets: Vec<CollectionId>,
    nullable: bool,
    unique: bool,
    on_delete: OnDeletePolicy,
}

impl RelationDescriptor {
    pub(crate) fn new(cardinality: Cardinality, targets: Vec<CollectionId>) -> Self {
        RelationDescriptor {
            cardinality,
            targets,
            nullable: false,
            unique: false,
            on_delete: OnDeletePolicy::Nullify,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// A target record may be referenced by at most one owner through this field.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn on_delete(mut self, policy: OnDeletePolicy) -> Self {
        self.on_delete = policy;
        self
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn targets(&self) -> &[CollectionId] {
        &self.targets
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_polymorphic(&self) -> bool {
        self.targets.len() > 1
    }

    pub fn on_delete_policy(&self) -> OnDeletePolicy {
        self.on_delete
    }

    pub fn accepts(&self, collection: CollectionId) -> bool {
        self.targets.contains(&collection)
    }

    /// The value a relation field holds before anything is assigned to it.
    pub(crate) fn default_link(&self) -> Link {
        match self.cardinality {
            Cardinality::One => Link::One(None),
            Cardinality::Many => Link::Many(Vec::new()),
        }
    }
}

/// Factory for relation descriptors, bound to the collections a store knows.
pub struct RelationBuilder<'a> {
    collections: &'a HashMap<String, CollectionId>,
}

impl<'a> RelationBuilder<'a> {
    pub(crate) fn new(collections: &'a HashMap<String, CollectionId>) -> Self {
        RelationBuilder { collections }
    }

    pub fn one(&self, target: &str) -> Result<RelationDescriptor> {
        self.one_of([target])
    }

    /// Polymorphic `one`: the field may hold a record from any listed collection.
    pub fn one_of<'t>(&self, targets: impl IntoIterator<Item = &'t str>) -> Result<RelationDescriptor> {
        Ok(RelationDescriptor::new(Cardinality::One, self.resolve(targets)?))
    }

    pub fn many(&self, target: &str) -> Result<RelationDescriptor> {
        self.many_of([target])
    }

    /// Polymorphic `many`: records from all listed collections share one list.
    pub fn many_of<'t>(&self, targets: impl IntoIterator<Item = &'t str>) -> Result<RelationDescriptor> {
        Ok(RelationDescriptor::new(Cardinality::Many, self.resolve(targets)?))
    }

    fn resolve<'t>(&self, targets: impl IntoIterator<Item = &'t str>) -> Result<Vec<CollectionId>> {
        let mut ids = Vec::new();
        for target in targets {
            let id = self
                .collections
                .get(target)
                .copied()
                .ok_or_else(|| StubDbError::UnknownCollection(target.to_string()))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(StubDbError::Schema("Relation must name at least one target".into()));
        }
        Ok(ids)
    }
}

/// Stored value of a relation field: identity keys, never nested records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    One(Option<RecordKey>),
    Many(Vec<RecordKey>),
}

impl Link {
    pub fn keys(&self) -> &[RecordKey] {
        match self {
            Link::One(Some(key)) => std::slice::from_ref(key),
            Link::One(None) => &[],
            Link::Many(keys) => keys,
        }
    }

    pub fn contains(&self, key: RecordKey) -> bool {
        self.keys().contains(&key)
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Link::One(_) => Cardinality::One,
            Link::Many(_) => Cardinality::Many,
        }
    }

    /// Drop every reference to `key`. Returns whether anything changed.
    pub(crate) fn sever(&mut self, key: RecordKey) -> bool {
        match self {
            Link::One(slot) if *slot == Some(key) => {
                *slot = None;
                true
            }
            Link::One(_) => false,
            Link::Many(keys) => {
                let before = keys.len();
                keys.retain(|k| *k != key);
                keys.len() != before
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> HashMap<String, CollectionId> {
        HashMap::from([
            ("users".to_string(), CollectionId::new(0, 0)),
            ("posts".to_string(), CollectionId::new(0, 1)),
            ("videos".to_string(), CollectionId::new(0, 2)),
        ])
    }

    #[test]
    fn test_builder_resolves_targets() {
        let names = names();
        let builder = RelationBuilder::new(&names);

        let author = builder.one("users").unwrap().nullable();
        assert_eq!(author.cardinality(), Cardinality::One);
        assert_eq!(author.targets(), &[CollectionId::new(0, 0)]);
        assert!(author.is_nullable());
        assert!(!author.is_unique());
        assert_eq!(author.on_delete_policy(), OnDeletePolicy::Nullify);

        let media = builder.many_of(["posts", "videos", "posts"]).unwrap().unique();
        assert_eq!(media.targets(), &[CollectionId::new(0, 1), CollectionId::new(0, 2)]);
        assert!(media.is_polymorphic());
        assert!(media.is_unique());
        assert_eq!(media.default_link(), Link::Many(vec![]));
    }

    #[test]
    fn test_unknown_target_is_reported_immediately() {
        let names = names();
        let err = RelationBuilder::new(&names).one("comments").unwrap_err();
        assert!(matches!(err, StubDbError::UnknownCollection(name) if name == "comments"));
    }

    #[test]
    fn test_sever_link() {
        let a = RecordKey::new(CollectionId::new(0, 0), 1);
        let b = RecordKey::new(CollectionId::new(0, 0), 2);

        let mut one = Link::One(Some(a));
        assert!(!one.sever(b));
        assert!(one.sever(a));
        assert_eq!(one, Link::One(None));

        let mut many = Link::Many(vec![a, b, a]);
        assert!(many.sever(a));
        assert_eq!(many.keys(), &[b]);
    }
}

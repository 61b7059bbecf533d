mod collection;
mod diff;
mod options;
mod paginate;

pub use collection::Collection;
pub use options::{
    DeleteOptions, Direction, FindOptions, OrderBy, UpdateData, UpdateOptions, Updater,
};

use crate::error::{Result, StubDbError};
use crate::hooks::{HookEvent, Hooks};
use crate::query::comparator::sort_order;
use crate::query::{Condition, Query, Subject, Where};
use crate::record::{CollectionId, Draft, Record, RecordInput, RecordKey};
use crate::relation::{Cardinality, Link, RelationBuilder, RelationDescriptor};
use crate::schema::{
    parse_schema, parse_schema_str, Issue, OnDeletePolicy, RelationDefinition, Schema,
    SchemaDefinition,
};
use crate::validation::ObjectSchema;
use diff::{diff_fields, Change};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// How many relation levels a materialized record expands. Relation fields
/// of related records are reset to their relation default.
const MATERIALIZE_DEPTH: usize = 1;

/// The main entry point for stubdb.
/// Owns every collection, hands out collection handles for CRUD operations,
/// and keeps relations between collections consistent.
pub struct Store {
    id: u64,
    collections: Vec<CollectionState>,
    names: HashMap<String, CollectionId>,
    next_seq: u64,
}

struct CollectionState {
    name: String,
    schema: Box<dyn Schema>,
    readonly: bool,
    relations: Option<BTreeMap<String, RelationDescriptor>>,
    records: Vec<StoredRecord>,
    hooks: Hooks,
}

/// Storage form of a record: validated plain fields plus relation links.
struct StoredRecord {
    key: RecordKey,
    fields: Map<String, Value>,
    links: BTreeMap<String, Link>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Store {
            id: NEXT_STORE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            collections: Vec::new(),
            names: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Build a store from a YAML schema document: every collection gets an
    /// [`ObjectSchema`] validator and its declared relations.
    pub fn from_schema_str(yaml: &str) -> Result<Self> {
        let schema = parse_schema_str(yaml)?;
        Self::from_definition(&schema)
    }

    pub fn from_schema_file(path: &Path) -> Result<Self> {
        let schema = parse_schema(path)?;
        Self::from_definition(&schema)
    }

    pub fn from_definition(schema: &SchemaDefinition) -> Result<Self> {
        let mut store = Store::new();

        for (name, definition) in &schema.collections {
            let validator = ObjectSchema::from_definition(schema, name).ok_or_else(|| {
                StubDbError::Schema(format!("Collection '{name}' is missing from the schema"))
            })?;
            store.insert_collection(name, Box::new(validator), definition.readonly)?;
        }

        // Relations second: targets may be declared after their holders
        for (name, definition) in &schema.collections {
            if definition.relations.is_empty() {
                continue;
            }
            store.define_relations(name, |r| {
                definition
                    .relations
                    .iter()
                    .map(|(field, relation)| Ok((field.clone(), relation_from_definition(r, relation)?)))
                    .collect::<Result<Vec<_>>>()
            })?;
        }

        Ok(store)
    }

    /// Register a collection validated by `schema`.
    pub fn define_collection(
        &mut self,
        name: &str,
        schema: impl Schema + 'static,
    ) -> Result<CollectionId> {
        self.insert_collection(name, Box::new(schema), false)
    }

    fn insert_collection(
        &mut self,
        name: &str,
        schema: Box<dyn Schema>,
        readonly: bool,
    ) -> Result<CollectionId> {
        if self.names.contains_key(name) {
            return Err(StubDbError::Schema(format!(
                "Collection '{name}' is already defined"
            )));
        }

        let id = CollectionId::new(self.id, self.collections.len());
        self.collections.push(CollectionState {
            name: name.to_string(),
            schema,
            readonly,
            relations: None,
            records: Vec::new(),
            hooks: Hooks::new(),
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declare the relation fields of a collection. May be called once per
    /// collection; targets may be any collection already defined, including
    /// the collection itself.
    ///
    /// ```ignore
    /// store.define_relations("posts", |r| {
    ///     Ok([("author", r.one("users")?), ("tags", r.many("tags")?.unique())])
    /// })?;
    /// ```
    pub fn define_relations<F, I, K>(&mut self, name: &str, build: F) -> Result<()>
    where
        F: FnOnce(&RelationBuilder<'_>) -> Result<I>,
        I: IntoIterator<Item = (K, RelationDescriptor)>,
        K: Into<String>,
    {
        let id = self.collection_id(name)?;
        if self.state(id).relations.is_some() {
            return Err(StubDbError::RelationsAlreadyDefined(name.to_string()));
        }

        let relations: BTreeMap<String, RelationDescriptor> = {
            let builder = RelationBuilder::new(&self.names);
            build(&builder)?
                .into_iter()
                .map(|(field, descriptor)| (field.into(), descriptor))
                .collect()
        };

        if let Some(fields) = self.state(id).schema.fields() {
            if let Some(field) = relations.keys().find(|field| fields.contains(*field)) {
                return Err(StubDbError::Schema(format!(
                    "Collection '{name}': '{field}' is declared both as a field and as a relation"
                )));
            }
        }

        let shadowed = self.state(id).records.iter().find_map(|record| {
            relations
                .keys()
                .find(|field| record.fields.contains_key(*field))
                .map(|field| (record.key, field))
        });
        if let Some((key, field)) = shadowed {
            return Err(StubDbError::Schema(format!(
                "Collection '{name}': {} already holds a plain '{field}' value",
                self.describe(key)
            )));
        }

        log::debug!(
            "Defined relations for '{name}': {:?}",
            relations.keys().collect::<Vec<_>>()
        );
        self.state_mut(id).relations = Some(relations);
        Ok(())
    }

    /// Get a collection handle
    pub fn collection(&mut self, name: &str) -> Result<Collection<'_>> {
        let id = self.collection_id(name)?;
        Ok(Collection::new(self, id))
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Collection names in definition order
    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.iter().map(|c| c.name.as_str()).collect()
    }

    /// Event emitter of a collection
    pub fn hooks(&mut self, name: &str) -> Result<&mut Hooks> {
        let id = self.collection_id(name)?;
        Ok(&mut self.state_mut(id).hooks)
    }

    pub fn relations(&self, name: &str) -> Result<Option<&BTreeMap<String, RelationDescriptor>>> {
        let id = self.collection_id(name)?;
        Ok(self.state(id).relations.as_ref())
    }

    /// Materialize the current state of a record, if it still exists.
    pub fn get(&self, key: RecordKey) -> Option<Record> {
        self.materialize(key)
    }

    // ── Internals shared with collection handles ───────────────────

    fn collection_id(&self, name: &str) -> Result<CollectionId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| StubDbError::UnknownCollection(name.to_string()))
    }

    /// Whether `id` was issued by this store. Keys coming from callers
    /// must pass this before `state` is used on them.
    fn owns(&self, id: CollectionId) -> bool {
        id.store == self.id && id.index < self.collections.len()
    }

    /// State of a collection issued by this store.
    fn state(&self, id: CollectionId) -> &CollectionState {
        &self.collections[id.index]
    }

    fn state_mut(&mut self, id: CollectionId) -> &mut CollectionState {
        &mut self.collections[id.index]
    }

    fn stored(&self, key: RecordKey) -> Option<&StoredRecord> {
        if !self.owns(key.collection) {
            return None;
        }
        self.state(key.collection)
            .records
            .iter()
            .find(|record| record.key == key)
    }

    fn relation(&self, id: CollectionId, field: &str) -> Option<&RelationDescriptor> {
        self.state(id).relations.as_ref()?.get(field)
    }

    /// Human-readable record identity, e.g. `users#3`.
    fn describe(&self, key: RecordKey) -> String {
        if !self.owns(key.collection) {
            return format!("<foreign>#{}", key.seq);
        }
        format!("{}#{}", self.state(key.collection).name, key.seq)
    }

    fn ensure_writable(&self, id: CollectionId) -> Result<()> {
        let state = self.state(id);
        if state.readonly {
            return Err(StubDbError::Readonly(state.name.clone()));
        }
        Ok(())
    }

    // ── Materialization ────────────────────────────────────────────

    fn materialize(&self, key: RecordKey) -> Option<Record> {
        self.stored(key)
            .map(|stored| self.materialize_stored(stored, MATERIALIZE_DEPTH))
    }

    fn materialize_stored(&self, stored: &StoredRecord, depth: usize) -> Record {
        let state = self.state(stored.key.collection);
        let mut value = stored.fields.clone();

        if let Some(relations) = &state.relations {
            for (field, descriptor) in relations {
                match self.relation_value(descriptor, stored.links.get(field), depth) {
                    Some(resolved) => {
                        value.insert(field.clone(), resolved);
                    }
                    None => {
                        value.remove(field);
                    }
                }
            }
        }

        Record::new(stored.key, state.name.clone(), Value::Object(value))
    }

    /// Read view of a relation field. `None` means the field is omitted: an
    /// unset non-nullable `one` relation.
    fn relation_value(
        &self,
        descriptor: &RelationDescriptor,
        link: Option<&Link>,
        depth: usize,
    ) -> Option<Value> {
        let keys = link.map(Link::keys).unwrap_or(&[]);

        match descriptor.cardinality() {
            Cardinality::One => {
                let resolved = if depth > 0 {
                    keys.first()
                        .and_then(|key| self.stored(*key))
                        .map(|stored| self.materialize_stored(stored, depth - 1).into_value())
                } else {
                    None
                };
                match resolved {
                    Some(value) => Some(value),
                    None if descriptor.is_nullable() => Some(Value::Null),
                    None => None,
                }
            }
            Cardinality::Many => {
                let items = if depth > 0 {
                    keys.iter()
                        .filter_map(|key| self.stored(*key))
                        .map(|stored| self.materialize_stored(stored, depth - 1).into_value())
                        .collect()
                } else {
                    Vec::new()
                };
                Some(Value::Array(items))
            }
        }
    }

    // ── Query execution ────────────────────────────────────────────

    /// Matching keys in storage order, then sorted by `order_by` (stable).
    fn select(
        &self,
        id: CollectionId,
        query: &Query,
        order_by: &[OrderBy],
    ) -> Result<Vec<RecordKey>> {
        self.check_query(id, query)?;

        let mut keys: Vec<RecordKey> = self
            .state(id)
            .records
            .iter()
            .filter(|stored| query.test_subject(&StoredSubject { store: self, stored }))
            .map(|stored| stored.key)
            .collect();

        if !order_by.is_empty() {
            self.sort_keys(&mut keys, order_by);
        }
        Ok(keys)
    }

    /// Reject shapes naming fields that no targeted collection can hold.
    fn check_query(&self, id: CollectionId, query: &Query) -> Result<()> {
        for shape in query.shapes() {
            self.check_shape(&[id], shape)?;
        }
        Ok(())
    }

    fn check_shape(&self, targets: &[CollectionId], shape: &Where) -> Result<()> {
        for (field, condition) in shape.conditions() {
            if field.is_empty() {
                return Err(StubDbError::Query(
                    "Query shape contains an empty field name".into(),
                ));
            }

            let mut known = false;
            let mut related = Vec::new();
            for &id in targets {
                if let Some(descriptor) = self.relation(id, field) {
                    known = true;
                    related.extend(descriptor.targets().iter().copied());
                } else {
                    match self.state(id).schema.fields() {
                        None => known = true,
                        Some(fields) => known |= fields.iter().any(|f| f == field),
                    }
                }
            }

            if !known {
                let names: Vec<&str> = targets
                    .iter()
                    .map(|id| self.state(*id).name.as_str())
                    .collect();
                return Err(StubDbError::Query(format!(
                    "Unknown field '{field}' in query on '{}'",
                    names.join("' | '")
                )));
            }

            if let Condition::Nested(inner) = condition {
                if !related.is_empty() {
                    related.sort();
                    related.dedup();
                    self.check_shape(&related, inner)?;
                }
            }
        }
        Ok(())
    }

    fn sort_keys(&self, keys: &mut Vec<RecordKey>, order_by: &[OrderBy]) {
        let mut decorated: Vec<(RecordKey, Vec<Value>)> = keys
            .iter()
            .map(|key| {
                let values = order_by
                    .iter()
                    .map(|order| self.sort_value(*key, &order.path))
                    .collect();
                (*key, values)
            })
            .collect();

        decorated.sort_by(|(_, a), (_, b)| {
            for ((x, y), order) in a.iter().zip(b).zip(order_by) {
                let ordering = match order.direction {
                    Direction::Asc => sort_order(x, y),
                    Direction::Desc => sort_order(x, y).reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        *keys = decorated.into_iter().map(|(key, _)| key).collect();
    }

    /// Value at `path`, following `one` relations. `many` relations and
    /// dangling links sort as null.
    fn sort_value(&self, key: RecordKey, path: &[String]) -> Value {
        let Some(mut current) = self.stored(key) else {
            return Value::Null;
        };

        for (index, segment) in path.iter().enumerate() {
            if let Some(descriptor) = self.relation(current.key.collection, segment) {
                if descriptor.cardinality() == Cardinality::Many {
                    return Value::Null;
                }
                let next = current
                    .links
                    .get(segment)
                    .and_then(|link| link.keys().first())
                    .and_then(|key| self.stored(*key));
                match next {
                    Some(next) => current = next,
                    None => return Value::Null,
                }
                continue;
            }

            let mut value = current.fields.get(segment);
            for rest in &path[index + 1..] {
                value = value.and_then(|v| v.get(rest));
            }
            return value.cloned().unwrap_or(Value::Null);
        }

        self.materialize_stored(current, 0).into_value()
    }

    // ── Writes ─────────────────────────────────────────────────────

    fn create_record(&mut self, id: CollectionId, input: RecordInput) -> Result<Record> {
        self.ensure_writable(id)?;
        self.reject_relation_values(id, &input.fields)?;
        self.check_links(id, None, &input.relations)?;
        let fields = self.parse_fields(id, input.fields.clone())?;

        let mut links: BTreeMap<String, Link> = self
            .state(id)
            .relations
            .iter()
            .flatten()
            .map(|(field, descriptor)| (field.clone(), descriptor.default_link()))
            .collect();
        links.extend(input.relations.clone());

        self.next_seq += 1;
        let key = RecordKey::new(id, self.next_seq);
        let stored = StoredRecord { key, fields, links };
        let record = self.materialize_stored(&stored, MATERIALIZE_DEPTH);
        self.state_mut(id).records.push(stored);

        log::debug!("Created {}", self.describe(key));
        self.state_mut(id).hooks.emit(&HookEvent::Create {
            record: record.clone(),
            initial_values: input,
        });
        Ok(record)
    }

    /// Run `data` against a draft of the record, validate, then commit and
    /// emit one `update` event per changed path. Nothing is written when
    /// validation or relation checks fail.
    fn update_record(
        &mut self,
        id: CollectionId,
        key: RecordKey,
        data: &mut UpdateData<'_>,
    ) -> Result<Record> {
        self.ensure_writable(id)?;
        let stored = self.stored(key).ok_or_else(|| StubDbError::NotFound {
            collection: self.state(id).name.clone(),
            operation: "update",
        })?;

        let prev_record = self.materialize_stored(stored, MATERIALIZE_DEPTH);
        let current_links = self.links_with_defaults(stored);
        let mut draft = Draft::new(stored.fields.clone(), current_links.clone());
        data.apply(&mut draft, &prev_record);
        let Draft { fields, links } = draft;

        let changed_links: BTreeMap<String, Link> = links
            .into_iter()
            .filter(|(field, link)| current_links.get(field) != Some(link))
            .collect();

        self.reject_relation_values(id, &fields)?;
        self.check_links(id, Some(key), &changed_links)?;
        let fields = self.parse_fields(id, fields)?;

        let field_changes = diff_fields(&stored.fields, &fields);
        if field_changes.is_empty() && changed_links.is_empty() {
            return Ok(prev_record);
        }

        if let Some(record) = self
            .state_mut(id)
            .records
            .iter_mut()
            .find(|record| record.key == key)
        {
            record.fields = fields;
            record.links.extend(changed_links.clone());
        }

        let next_record = self.materialize(key).ok_or_else(|| StubDbError::NotFound {
            collection: self.state(id).name.clone(),
            operation: "update",
        })?;

        let mut changes = field_changes;
        changes.extend(changed_links.keys().map(|field| Change {
            path: vec![field.clone()],
            prev: prev_record.get(field).cloned().unwrap_or(Value::Null),
            next: next_record.get(field).cloned().unwrap_or(Value::Null),
        }));
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        log::debug!(
            "Updated {} ({} changed paths)",
            self.describe(key),
            changes.len()
        );
        let hooks = &mut self.state_mut(id).hooks;
        for change in changes {
            hooks.emit(&HookEvent::Update {
                prev_record: prev_record.clone(),
                next_record: next_record.clone(),
                path: change.path,
                prev_value: change.prev,
                next_value: change.next,
            });
        }
        Ok(next_record)
    }

    /// Delete a record together with everything its `cascade` holders pull
    /// along. The whole plan is checked against `error` policies and
    /// readonly collections before anything is removed. Returns snapshots
    /// of the removed records, `root` first.
    fn delete_record(&mut self, root: RecordKey) -> Result<Vec<Record>> {
        let mut plan = vec![root];
        let mut planned: HashSet<RecordKey> = HashSet::from([root]);
        let mut blocked = Vec::new();

        let mut index = 0;
        while index < plan.len() {
            let target = plan[index];
            index += 1;
            for (holder, field, policy) in self.holders(target) {
                match policy {
                    OnDeletePolicy::Cascade => {
                        if planned.insert(holder) {
                            plan.push(holder);
                        }
                    }
                    OnDeletePolicy::Error => blocked.push((target, holder, field)),
                    OnDeletePolicy::Nullify => {}
                }
            }
        }

        if let Some((target, holder, field)) = blocked
            .iter()
            .find(|(_, holder, _)| !planned.contains(holder))
        {
            return Err(StubDbError::ReferentialIntegrity(format!(
                "Cannot delete {}: referenced by {} (field '{field}')",
                self.describe(*target),
                self.describe(*holder),
            )));
        }
        for key in &plan {
            self.ensure_writable(key.collection)?;
        }

        let snapshots: Vec<Record> = plan.iter().filter_map(|key| self.materialize(*key)).collect();
        self.remove_records(&planned);

        for record in &snapshots {
            log::debug!("Deleted {}", self.describe(record.key()));
            self.state_mut(record.key().collection)
                .hooks
                .emit(&HookEvent::Delete {
                    record: record.clone(),
                });
        }
        Ok(snapshots)
    }

    /// Remove every record of a collection without emitting events.
    fn clear_collection(&mut self, id: CollectionId) -> Result<usize> {
        self.ensure_writable(id)?;
        let keys: HashSet<RecordKey> = self.state(id).records.iter().map(|r| r.key).collect();
        self.remove_records(&keys);
        Ok(keys.len())
    }

    /// Records holding a relation link to `target`, with the policy of the
    /// holding field.
    fn holders(&self, target: RecordKey) -> Vec<(RecordKey, String, OnDeletePolicy)> {
        let mut holders = Vec::new();
        for state in &self.collections {
            let Some(relations) = &state.relations else {
                continue;
            };
            for (field, descriptor) in relations {
                if !descriptor.accepts(target.collection) {
                    continue;
                }
                for record in &state.records {
                    if record.links.get(field).is_some_and(|link| link.contains(target)) {
                        holders.push((record.key, field.clone(), descriptor.on_delete_policy()));
                    }
                }
            }
        }
        holders
    }

    /// Drop records from storage and sever every link pointing at them.
    fn remove_records(&mut self, keys: &HashSet<RecordKey>) {
        if keys.is_empty() {
            return;
        }
        let mut severed = 0;
        for state in &mut self.collections {
            state.records.retain(|record| !keys.contains(&record.key));
            for record in &mut state.records {
                for link in record.links.values_mut() {
                    for key in keys {
                        if link.sever(*key) {
                            severed += 1;
                        }
                    }
                }
            }
        }
        if severed > 0 {
            log::debug!("Severed {severed} references to removed records");
        }
    }

    fn links_with_defaults(&self, stored: &StoredRecord) -> BTreeMap<String, Link> {
        let mut links: BTreeMap<String, Link> = self
            .state(stored.key.collection)
            .relations
            .iter()
            .flatten()
            .map(|(field, descriptor)| (field.clone(), descriptor.default_link()))
            .collect();
        links.extend(stored.links.clone());
        links
    }

    /// Relation fields only accept record references.
    fn reject_relation_values(&self, id: CollectionId, fields: &Map<String, Value>) -> Result<()> {
        if let Some(field) = fields.keys().find(|field| self.relation(id, field).is_some()) {
            return Err(StubDbError::InvalidReference {
                collection: self.state(id).name.clone(),
                field: field.clone(),
                reason: "expected a record reference, got a plain value".into(),
            });
        }
        Ok(())
    }

    /// Check relation values by identity: right cardinality, nullability,
    /// live records of an allowed target, and uniqueness across owners
    /// (ignoring `owner` itself).
    fn check_links(
        &self,
        id: CollectionId,
        owner: Option<RecordKey>,
        links: &BTreeMap<String, Link>,
    ) -> Result<()> {
        let state = self.state(id);

        for (field, link) in links {
            let descriptor =
                self.relation(id, field)
                    .ok_or_else(|| StubDbError::UnknownRelation {
                        collection: state.name.clone(),
                        field: field.clone(),
                    })?;
            let invalid = |reason: String| StubDbError::InvalidReference {
                collection: state.name.clone(),
                field: field.clone(),
                reason,
            };

            if link.cardinality() != descriptor.cardinality() {
                return Err(invalid(match descriptor.cardinality() {
                    Cardinality::One => "expected a single record reference".into(),
                    Cardinality::Many => "expected a list of record references".into(),
                }));
            }
            if *link == Link::One(None) && !descriptor.is_nullable() {
                return Err(invalid("relation is not nullable".into()));
            }

            for key in link.keys() {
                if !self.owns(key.collection) {
                    return Err(invalid("the record belongs to another store".into()));
                }
                if !descriptor.accepts(key.collection) {
                    let expected: Vec<&str> = descriptor
                        .targets()
                        .iter()
                        .map(|target| self.state(*target).name.as_str())
                        .collect();
                    return Err(invalid(format!(
                        "a record from '{}' is not a valid target (expected '{}')",
                        self.state(key.collection).name,
                        expected.join("' | '")
                    )));
                }
                if self.stored(*key).is_none() {
                    return Err(invalid(format!("{} no longer exists", self.describe(*key))));
                }
            }

            if descriptor.is_unique() {
                for other in &state.records {
                    if Some(other.key) == owner {
                        continue;
                    }
                    let Some(other_link) = other.links.get(field) else {
                        continue;
                    };
                    if let Some(taken) = link.keys().iter().find(|key| other_link.contains(**key)) {
                        return Err(StubDbError::RelationIntegrity {
                            collection: state.name.clone(),
                            field: field.clone(),
                            owner: self.describe(other.key),
                            target_collection: self.state(taken.collection).name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Run plain fields through the collection schema.
    fn parse_fields(&self, id: CollectionId, fields: Map<String, Value>) -> Result<Map<String, Value>> {
        let state = self.state(id);
        match state.schema.parse(Value::Object(fields)) {
            Ok(Value::Object(mut output)) => {
                if let Some(relations) = &state.relations {
                    output.retain(|field, _| !relations.contains_key(field));
                }
                Ok(output)
            }
            Ok(other) => Err(StubDbError::Validation {
                collection: state.name.clone(),
                issues: vec![Issue::new(format!(
                    "Schema output must be an object, got {other}"
                ))],
            }),
            Err(issues) => Err(StubDbError::Validation {
                collection: state.name.clone(),
                issues,
            }),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for state in &self.collections {
            map.entry(&state.name, &state.records.len());
        }
        map.finish()
    }
}

fn relation_from_definition(
    builder: &RelationBuilder<'_>,
    definition: &RelationDefinition,
) -> Result<RelationDescriptor> {
    let mut descriptor = match (&definition.one, &definition.many) {
        (Some(target), None) => builder.one_of(target.targets())?,
        (None, Some(target)) => builder.many_of(target.targets())?,
        _ => {
            return Err(StubDbError::Schema(
                "Relation must declare exactly one of 'one' or 'many'".into(),
            ))
        }
    };
    if definition.nullable {
        descriptor = descriptor.nullable();
    }
    if definition.unique {
        descriptor = descriptor.unique();
    }
    if let Some(policy) = definition.on_delete {
        descriptor = descriptor.on_delete(policy);
    }
    Ok(descriptor)
}

/// A stored record seen through the query layer: relation fields resolve
/// to live related records, to any depth.
struct StoredSubject<'a> {
    store: &'a Store,
    stored: &'a StoredRecord,
}

impl Subject for StoredSubject<'_> {
    fn value(&self, field: &str) -> Cow<'_, Value> {
        match self.store.relation(self.stored.key.collection, field) {
            Some(descriptor) => Cow::Owned(
                self.store
                    .relation_value(descriptor, self.stored.links.get(field), MATERIALIZE_DEPTH)
                    .unwrap_or(Value::Null),
            ),
            None => match self.stored.fields.get(field) {
                Some(value) => Cow::Borrowed(value),
                None => Cow::Owned(Value::Null),
            },
        }
    }

    fn related(&self, field: &str) -> Option<Vec<Box<dyn Subject + '_>>> {
        self.store.relation(self.stored.key.collection, field)?;
        let keys = self.stored.links.get(field).map(Link::keys).unwrap_or(&[]);
        Some(
            keys.iter()
                .filter_map(|key| self.store.stored(*key))
                .map(|stored| {
                    Box::new(StoredSubject {
                        store: self.store,
                        stored,
                    }) as Box<dyn Subject + '_>
                })
                .collect(),
        )
    }

    fn record(&self) -> Option<Cow<'_, Record>> {
        Some(Cow::Owned(
            self.store.materialize_stored(self.stored, MATERIALIZE_DEPTH),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Where;
    use crate::schema::AnySchema;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_test_store() -> Store {
        let mut store = Store::new();
        store.define_collection("users", AnySchema).unwrap();
        store.define_collection("groups", AnySchema).unwrap();
        store
    }

    #[test]
    fn test_from_schema_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("schema.yaml");
        std::fs::write(
            &path,
            r#"
collections:
  teams:
    fields:
      name: { type: string, required: true }
  players:
    fields:
      name: { type: string, required: true }
    relations:
      team: { one: teams, nullable: true, on_delete: cascade }
"#,
        )
        .unwrap();

        let mut store = Store::from_schema_file(&path).unwrap();
        assert_eq!(store.collection_names(), vec!["players", "teams"]);

        let team = store
            .collection("teams")
            .unwrap()
            .create(RecordInput::new().set("name", "red"))
            .unwrap();
        let player = store
            .collection("players")
            .unwrap()
            .create(RecordInput::new().set("name", "ann").one("team", &team))
            .unwrap();
        assert_eq!(player["team"]["name"], "red");

        let relations = store.relations("players").unwrap().unwrap();
        assert_eq!(relations["team"].on_delete_policy(), OnDeletePolicy::Cascade);
        assert!(relations["team"].is_nullable());
    }

    #[test]
    fn test_missing_schema_file() {
        let tmp = TempDir::new().unwrap();
        let err = Store::from_schema_file(&tmp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, StubDbError::Io(_)));
    }

    #[test]
    fn test_duplicate_and_unknown_collections() {
        let mut store = setup_test_store();
        let err = store.define_collection("users", AnySchema).unwrap_err();
        assert!(matches!(err, StubDbError::Schema(_)));
        assert!(matches!(
            store.collection("nope"),
            Err(StubDbError::UnknownCollection(_))
        ));
        assert!(store.has_collection("groups"));
    }

    #[test]
    fn test_define_relations_once() {
        let mut store = setup_test_store();
        store
            .define_relations("users", |r| {
                Ok([("group", r.one("groups")?.nullable()), ("friends", r.many("users")?)])
            })
            .unwrap();

        let err = store
            .define_relations("users", |r| Ok([("group", r.one("groups")?)]))
            .unwrap_err();
        assert!(matches!(err, StubDbError::RelationsAlreadyDefined(_)));

        let err = store
            .define_relations("groups", |r| Ok([("owner", r.one("admins")?)]))
            .unwrap_err();
        assert!(matches!(err, StubDbError::UnknownCollection(_)));
        assert!(store.relations("groups").unwrap().is_none());
    }

    #[test]
    fn test_relation_cannot_shadow_field() {
        let mut store = Store::from_schema_str(
            r#"
collections:
  users:
    fields:
      name: { type: string }
"#,
        )
        .unwrap();
        let err = store
            .define_relations("users", |r| Ok([("name", r.one("users")?)]))
            .unwrap_err();
        assert!(matches!(err, StubDbError::Schema(_)));
    }

    #[test]
    fn test_records_created_before_relations_get_defaults() {
        let mut store = setup_test_store();
        let early = store
            .collection("users")
            .unwrap()
            .create(RecordInput::new().set("name", "early"))
            .unwrap();
        assert_eq!(early.value(), &json!({ "name": "early" }));

        store
            .define_relations("users", |r| {
                Ok([("group", r.one("groups")?.nullable()), ("friends", r.many("users")?)])
            })
            .unwrap();

        let early = store.get(early.key()).unwrap();
        assert_eq!(
            early.value(),
            &json!({ "name": "early", "group": null, "friends": [] })
        );

        let found = store
            .collection("users")
            .unwrap()
            .find_many(
                Where::new().eq("group", Value::Null),
                FindOptions::new(),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_closure_schema() {
        let mut store = Store::new();
        store
            .define_collection("counters", |input: Value| {
                let count = input.get("count").and_then(Value::as_i64);
                match count {
                    Some(count) if count >= 0 => Ok(json!({ "count": count, "even": count % 2 == 0 })),
                    _ => Err(vec![Issue::at(["count"], "must be a non-negative integer")]),
                }
            })
            .unwrap();

        let mut counters = store.collection("counters").unwrap();
        let counter = counters.create(RecordInput::new().set("count", 4)).unwrap();
        assert_eq!(counter["even"], true);

        let err = counters.create(RecordInput::new().set("count", -1)).unwrap_err();
        assert!(err.to_string().contains("count: must be a non-negative integer"));
    }

    fn with_friend_relation(store: &mut Store) {
        store
            .define_relations("users", |r| Ok([("friend", r.one("users")?.nullable())]))
            .unwrap();
    }

    #[test]
    fn test_record_with_same_position_in_another_store() {
        let mut a = setup_test_store();
        let mut b = setup_test_store();
        with_friend_relation(&mut a);
        with_friend_relation(&mut b);

        let alice = a
            .collection("users")
            .unwrap()
            .create(RecordInput::new().set("name", "alice"))
            .unwrap();
        let bob = b
            .collection("users")
            .unwrap()
            .create(RecordInput::new().set("name", "bob"))
            .unwrap();
        assert!(!alice.is_same(&bob));

        let mut users = b.collection("users").unwrap();
        let err = users
            .create(RecordInput::new().set("name", "carol").one("friend", &alice))
            .unwrap_err();
        assert!(err.to_string().contains("another store"));

        let err = users
            .update(
                Query::all(),
                UpdateOptions::with(|draft, _| draft.set_one("friend", Some(&alice))),
            )
            .unwrap_err();
        assert!(matches!(err, StubDbError::InvalidReference { .. }));

        let page = users
            .find_many(Query::all(), FindOptions::new().cursor(&alice))
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(users.count(), 1);
        assert!(b.get(alice.key()).is_none());
    }

    #[test]
    fn test_record_from_collection_missing_in_this_store() {
        let mut a = setup_test_store();
        a.define_collection("tags", AnySchema).unwrap();
        let tag = a
            .collection("tags")
            .unwrap()
            .create(RecordInput::new().set("label", "rust"))
            .unwrap();

        let mut b = setup_test_store();
        with_friend_relation(&mut b);
        assert!(b.get(tag.key()).is_none());

        let err = b
            .collection("users")
            .unwrap()
            .create(RecordInput::new().set("name", "ann").one("friend", &tag))
            .unwrap_err();
        assert!(matches!(err, StubDbError::InvalidReference { .. }));
    }

    #[test]
    fn test_relation_cannot_shadow_stored_values() {
        let mut store = setup_test_store();
        store
            .collection("users")
            .unwrap()
            .create(RecordInput::new().set("name", "ann").set("group", "red"))
            .unwrap();

        let err = store
            .define_relations("users", |r| Ok([("group", r.one("groups")?)]))
            .unwrap_err();
        assert!(err.to_string().contains("already holds a plain 'group' value"));
        assert!(store.relations("users").unwrap().is_none());
    }

    #[test]
    fn test_get_after_delete() {
        let mut store = setup_test_store();
        let mut users = store.collection("users").unwrap();
        let user = users.create(RecordInput::new().set("name", "ann")).unwrap();
        users.delete(Query::all(), DeleteOptions::new()).unwrap();
        assert!(store.get(user.key()).is_none());
        assert_eq!(format!("{store:?}"), r#"{"users": 0, "groups": 0}"#);
    }
}

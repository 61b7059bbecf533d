use super::paginate::paginate;
use super::{DeleteOptions, FindOptions, Store, UpdateOptions};
use crate::error::{Result, StubDbError};
use crate::hooks::Hooks;
use crate::query::{IntoQuery, Query};
use crate::record::{CollectionId, Record, RecordInput, RecordKey};
use crate::relation::RelationDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Handle to one collection of a [`Store`].
///
/// The handle borrows the store mutably, so every operation runs to
/// completion before the next one starts and readers never observe a
/// half-applied write.
pub struct Collection<'a> {
    store: &'a mut Store,
    id: CollectionId,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(store: &'a mut Store, id: CollectionId) -> Self {
        Collection { store, id }
    }

    pub fn name(&self) -> &str {
        &self.store.state(self.id).name
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn is_readonly(&self) -> bool {
        self.store.state(self.id).readonly
    }

    pub fn hooks(&mut self) -> &mut Hooks {
        &mut self.store.state_mut(self.id).hooks
    }

    pub fn relations(&self) -> Option<&BTreeMap<String, RelationDescriptor>> {
        self.store.state(self.id).relations.as_ref()
    }

    // ── Create ─────────────────────────────────────────────────────

    /// Validate and store a new record, then emit `create`.
    pub fn create(&mut self, input: RecordInput) -> Result<Record> {
        self.store.create_record(self.id, input)
    }

    /// Create from any serializable value (typed API)
    pub fn create_from<T: Serialize>(&mut self, data: &T) -> Result<Record> {
        self.create(RecordInput::from_serialize(data)?)
    }

    /// Create `count` records in index order. Each record is committed on
    /// its own; a failure stops the batch and leaves earlier records stored.
    pub fn create_many<F>(&mut self, count: usize, mut factory: F) -> Result<Vec<Record>>
    where
        F: FnMut(usize) -> RecordInput,
    {
        let mut created = Vec::with_capacity(count);
        for index in 0..count {
            created.push(self.create(factory(index))?);
        }
        Ok(created)
    }

    // ── Read ───────────────────────────────────────────────────────

    pub fn find_first(&self, query: impl IntoQuery, options: FindOptions) -> Result<Option<Record>> {
        let take = options.take.unwrap_or(1);
        let keys = self.page(&query.into_query(), &options, Some(take))?;
        let found = keys.first().and_then(|key| self.store.materialize(*key));
        if found.is_none() && options.strict {
            return Err(self.not_found("find_first"));
        }
        Ok(found)
    }

    pub fn find_many(&self, query: impl IntoQuery, options: FindOptions) -> Result<Vec<Record>> {
        let keys = self.page(&query.into_query(), &options, options.take)?;
        let found: Vec<Record> = keys
            .iter()
            .filter_map(|key| self.store.materialize(*key))
            .collect();
        if found.is_empty() && options.strict {
            return Err(self.not_found("find_many"));
        }
        Ok(found)
    }

    /// `find_many`, deserialized into `T`.
    pub fn find_many_as<T: DeserializeOwned>(
        &self,
        query: impl IntoQuery,
        options: FindOptions,
    ) -> Result<Vec<T>> {
        self.find_many(query, options)?
            .iter()
            .map(Record::deserialize)
            .collect()
    }

    /// Every record in storage order.
    pub fn all(&self) -> Vec<Record> {
        self.store
            .state(self.id)
            .records
            .iter()
            .map(|stored| self.store.materialize_stored(stored, super::MATERIALIZE_DEPTH))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.store.state(self.id).records.len()
    }

    // ── Update ─────────────────────────────────────────────────────

    /// Update the first matching record.
    pub fn update(
        &mut self,
        query: impl IntoQuery,
        mut options: UpdateOptions<'_>,
    ) -> Result<Option<Record>> {
        self.store.ensure_writable(self.id)?;
        let keys = self
            .store
            .select(self.id, &query.into_query(), &options.order_by)?;
        let Some(key) = keys.first().copied() else {
            return self.empty_or_not_found(options.strict, "update");
        };
        self.store
            .update_record(self.id, key, &mut options.data)
            .map(Some)
    }

    /// Update every matching record in order. Records are committed one at
    /// a time; a failure stops the batch and leaves earlier updates applied.
    pub fn update_many(
        &mut self,
        query: impl IntoQuery,
        mut options: UpdateOptions<'_>,
    ) -> Result<Vec<Record>> {
        self.store.ensure_writable(self.id)?;
        let keys = self
            .store
            .select(self.id, &query.into_query(), &options.order_by)?;
        if keys.is_empty() && options.strict {
            return Err(self.not_found("update_many"));
        }

        let mut updated = Vec::with_capacity(keys.len());
        for key in keys {
            updated.push(self.store.update_record(self.id, key, &mut options.data)?);
        }
        Ok(updated)
    }

    // ── Delete ─────────────────────────────────────────────────────

    /// Delete the first matching record, applying relation delete policies.
    pub fn delete(&mut self, query: impl IntoQuery, options: DeleteOptions) -> Result<Option<Record>> {
        self.store.ensure_writable(self.id)?;
        let keys = self
            .store
            .select(self.id, &query.into_query(), &options.order_by)?;
        let Some(key) = keys.first().copied() else {
            return self.empty_or_not_found(options.strict, "delete");
        };
        Ok(self.store.delete_record(key)?.into_iter().next())
    }

    /// Delete every matching record. Returns the matched records in match
    /// order, including those removed by a cascade from an earlier match.
    pub fn delete_many(&mut self, query: impl IntoQuery, options: DeleteOptions) -> Result<Vec<Record>> {
        self.store.ensure_writable(self.id)?;
        let keys = self
            .store
            .select(self.id, &query.into_query(), &options.order_by)?;
        if keys.is_empty() && options.strict {
            return Err(self.not_found("delete_many"));
        }

        let selected: HashSet<RecordKey> = keys.iter().copied().collect();
        let mut removed: HashMap<RecordKey, Record> = HashMap::new();
        for key in &keys {
            if removed.contains_key(key) || self.store.stored(*key).is_none() {
                continue;
            }
            for record in self.store.delete_record(*key)? {
                if selected.contains(&record.key()) {
                    removed.insert(record.key(), record);
                }
            }
        }
        Ok(keys.iter().filter_map(|key| removed.remove(key)).collect())
    }

    /// Remove every record. Links held by other collections are severed;
    /// no events fire and delete policies do not apply. Returns the number
    /// of records removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.store.clear_collection(self.id)?;
        log::debug!("Cleared '{}' ({removed} records)", self.name());
        Ok(removed)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn page(&self, query: &Query, options: &FindOptions, take: Option<i64>) -> Result<Vec<RecordKey>> {
        let keys = self.store.select(self.id, query, &options.order_by)?;
        Ok(paginate(keys, options.cursor, take))
    }

    fn not_found(&self, operation: &'static str) -> StubDbError {
        StubDbError::NotFound {
            collection: self.name().to_string(),
            operation,
        }
    }

    fn empty_or_not_found(&self, strict: bool, operation: &'static str) -> Result<Option<Record>> {
        if strict {
            Err(self.not_found(operation))
        } else {
            Ok(None)
        }
    }
}

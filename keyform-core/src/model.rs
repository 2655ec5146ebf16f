//! Model-level CRUD orchestration.
//!
//! A [`Model`] reconciles schema-validated, synchronous-looking application
//! semantics with the asynchronous store underneath: every write passes
//! through validate → cast before any store mutation, every multi-record
//! read pulls raw records and narrows them through the query engine, and a
//! pending-delete cache hides scheduled deletions from reads before the
//! store confirms removal.
//!
//! Models are defined on a [`Session`](crate::session::Session) and handed
//! out as cheap handles; every handle to the same logical model shares one
//! schema and one pending-delete cache.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use log::{debug, warn};
use mea::rwlock::RwLock;
use rand::Rng;

use crate::{
    document::Document,
    error::{KeyformError, KeyformResult},
    query,
    schema::{IndexSpec, Schema},
    store::{KeyRange, KeyedStore, Record},
};

/// Per-model state shared by every handle to the same logical model.
#[derive(Debug)]
pub(crate) struct ModelState {
    pub(crate) name: String,
    pub(crate) collection: String,
    pub(crate) key_field: String,
    pub(crate) schema: Schema,
    /// Keys scheduled for deletion but not yet confirmed removed. Every read
    /// path consults this before predicate evaluation.
    pub(crate) pending_deletes: RwLock<HashSet<String>>,
}

impl ModelState {
    pub(crate) fn new(name: String, key_field: String, schema: Schema) -> Self {
        Self {
            collection: name.clone(),
            name,
            key_field,
            schema,
            pending_deletes: RwLock::new(HashSet::new()),
        }
    }
}

/// A handle to one defined model, bound to a live store.
///
/// All operations are asynchronous; each store call is its own transaction,
/// so there is no cross-operation atomicity (see [`Model::update_many`]).
#[derive(Debug)]
pub struct Model<'a, B: KeyedStore> {
    state: Arc<ModelState>,
    store: &'a B,
}

impl<'a, B: KeyedStore> Clone for Model<'a, B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            store: self.store,
        }
    }
}

impl<'a, B: KeyedStore> Model<'a, B> {
    pub(crate) fn new(state: Arc<ModelState>, store: &'a B) -> Self {
        Self { state, store }
    }

    /// The model's logical name.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// The store collection this model persists into.
    pub fn collection(&self) -> &str {
        &self.state.collection
    }

    /// The primary-key field name.
    pub fn key_field(&self) -> &str {
        &self.state.key_field
    }

    /// The compiled schema bound to this model.
    pub fn schema(&self) -> &Schema {
        &self.state.schema
    }

    /// The secondary-index requests derived from the schema tree: one per
    /// leaf field path, unique where the schema declares it.
    pub fn index_specs(&self) -> Vec<IndexSpec> {
        self.state.schema.index_paths()
    }

    /// Number of keys currently scheduled for deletion but not yet confirmed
    /// removed by the store.
    pub async fn pending_delete_count(&self) -> usize {
        self.state
            .pending_deletes
            .read()
            .await
            .len()
    }

    /// Inserts a new record, failing when its key already exists.
    ///
    /// The record is validated and cast first; when it carries no key, one
    /// is generated (current epoch milliseconds concatenated with a bounded
    /// random integer — probabilistically unique, not guaranteed). Store
    /// errors surface unmodified.
    pub async fn create(&self, record: Record) -> KeyformResult<Document<'a, B>> {
        let mut prepared = self.prepare(&record)?;
        if self.record_key(&prepared).is_none() {
            prepared.insert(self.state.key_field.clone(), self.generate_key());
        }
        let key = self
            .store
            .add(&self.state.collection, prepared.clone())
            .await?;
        debug!("created record {key} in {}", self.state.collection);
        Ok(Document::clean(self.clone(), prepared))
    }

    /// Inserts or overwrites a record (idempotent upsert, unlike
    /// [`Model::create`]).
    ///
    /// Key precedence: the explicit `key` argument, then the record's own
    /// key field, then a generated key.
    pub async fn insert_one(
        &self,
        record: Record,
        key: Option<&str>,
    ) -> KeyformResult<Document<'a, B>> {
        let mut prepared = self.prepare(&record)?;
        let key = match key {
            Some(key) => key.to_string(),
            None => self
                .record_key(&prepared)
                .unwrap_or_else(|| self.generate_key()),
        };
        prepared.insert(self.state.key_field.clone(), key);
        let key = self
            .store
            .put(&self.state.collection, prepared.clone())
            .await?;
        debug!("upserted record {key} into {}", self.state.collection);
        Ok(Document::clean(self.clone(), prepared))
    }

    /// Point lookup. Returns `Ok(None)` when the key is absent or the record
    /// is pending deletion.
    pub async fn find_by_key(&self, key: &str) -> KeyformResult<Option<Document<'a, B>>> {
        if self.is_pending_delete(key).await {
            return Ok(None);
        }
        Ok(self
            .store
            .get(&self.state.collection, key)
            .await?
            .map(|record| Document::clean(self.clone(), record)))
    }

    /// Full collection scan narrowed through the query engine. Returns the
    /// ordered (possibly empty) sequence of matches.
    pub async fn find(&self, query: &Record) -> KeyformResult<Vec<Document<'a, B>>> {
        let live = self.live_records(None).await?;
        Ok(query::filter(&live, query)?
            .into_iter()
            .map(|record| Document::clean(self.clone(), record))
            .collect())
    }

    /// Key-range scan, the bare key/range form of [`Model::find`]. No
    /// predicate is applied beyond the range itself.
    pub async fn find_range(&self, range: KeyRange) -> KeyformResult<Vec<Document<'a, B>>> {
        Ok(self
            .live_records(Some(range))
            .await?
            .into_iter()
            .map(|record| Document::clean(self.clone(), record))
            .collect())
    }

    /// Returns the first match in enumeration order, or `Ok(None)`.
    pub async fn find_one(&self, query: &Record) -> KeyformResult<Option<Document<'a, B>>> {
        let live = self.live_records(None).await?;
        Ok(query::find_first(&live, query)?.map(|record| Document::clean(self.clone(), record)))
    }

    /// Counts the records matching `query` without materializing documents.
    pub async fn count(&self, query: &Record) -> KeyformResult<usize> {
        let live = self.live_records(None).await?;
        let mut count = 0;
        for record in &live {
            if query::matches(record, query)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Shallow-merges `patch` over the record at `key`, re-validates and
    /// re-casts the merged record, forces the original key back, and
    /// upserts.
    ///
    /// # Errors
    ///
    /// [`KeyformError::NotFound`] when the key is absent or pending
    /// deletion.
    pub async fn find_by_key_and_update(
        &self,
        key: &str,
        patch: &Record,
    ) -> KeyformResult<Document<'a, B>> {
        if self.is_pending_delete(key).await {
            return Err(self.not_found(key));
        }
        let existing = self
            .store
            .get(&self.state.collection, key)
            .await?
            .ok_or_else(|| self.not_found(key))?;
        self.apply_update(existing, patch).await
    }

    /// Updates the first record matching `query` with `patch`.
    ///
    /// # Errors
    ///
    /// [`KeyformError::NotFound`] when no record matches.
    pub async fn update_one(
        &self,
        query: &Record,
        patch: &Record,
    ) -> KeyformResult<Document<'a, B>> {
        let live = self.live_records(None).await?;
        let target = query::find_first(&live, query)?
            .ok_or_else(|| self.not_found(&query.to_string()))?;
        self.apply_update(target, patch).await
    }

    /// Updates every record matching `query` with `patch`, one independent
    /// upsert per match.
    ///
    /// The batch is not atomic: a failing upsert aborts with that error and
    /// earlier writes remain applied.
    pub async fn update_many(
        &self,
        query: &Record,
        patch: &Record,
    ) -> KeyformResult<Vec<Document<'a, B>>> {
        let live = self.live_records(None).await?;
        let matched = query::filter(&live, query)?;
        let mut updated = Vec::with_capacity(matched.len());
        for record in matched {
            updated.push(self.apply_update(record, patch).await?);
        }
        Ok(updated)
    }

    /// Schedules deletion of the record at `key` and returns it, or
    /// `Ok(None)` when the key is absent or already pending deletion.
    ///
    /// The key is hidden from subsequent reads as soon as this resolves,
    /// whether or not the store has confirmed physical removal.
    pub async fn find_by_key_and_delete(
        &self,
        key: &str,
    ) -> KeyformResult<Option<Document<'a, B>>> {
        if self.is_pending_delete(key).await {
            return Ok(None);
        }
        let Some(existing) = self.store.get(&self.state.collection, key).await? else {
            return Ok(None);
        };
        self.schedule_delete(vec![key.to_string()]).await;
        Ok(Some(Document::clean(self.clone(), existing)))
    }

    /// Schedules deletion of the first record matching `query`. Returns
    /// whether a record was scheduled.
    pub async fn delete_one(&self, query: &Record) -> KeyformResult<bool> {
        let live = self.live_records(None).await?;
        match query::find_first(&live, query)? {
            Some(record) => {
                let key = self.require_key(&record)?;
                self.schedule_delete(vec![key]).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Schedules deletion of every record matching `query`. Returns the
    /// number of records scheduled.
    pub async fn delete_many(&self, query: &Record) -> KeyformResult<usize> {
        let live = self.live_records(None).await?;
        let matched = query::filter(&live, query)?;
        let mut keys = Vec::with_capacity(matched.len());
        for record in &matched {
            keys.push(self.require_key(record)?);
        }
        let count = keys.len();
        self.schedule_delete(keys).await;
        Ok(count)
    }

    /// Clears the entire collection unconditionally, bypassing validation
    /// and the pending-delete cache.
    pub async fn delete_all(&self) -> KeyformResult<()> {
        self.store.clear(&self.state.collection).await?;
        // Nothing is left for the tombstones to hide.
        self.state
            .pending_deletes
            .write()
            .await
            .clear();
        debug!("cleared collection {}", self.state.collection);
        Ok(())
    }

    /// Validates and casts a write-bound record, re-attaching its key (the
    /// key field is not part of the schema, so casting drops it).
    fn prepare(&self, record: &Record) -> KeyformResult<Record> {
        self.state.schema.validate(record)?;
        let mut prepared = self.state.schema.cast(record);
        if let Some(key) = record.get(&self.state.key_field) {
            prepared.insert(self.state.key_field.clone(), key.clone());
        }
        Ok(prepared)
    }

    /// Generates a primary key: current epoch milliseconds concatenated with
    /// a bounded random integer. Uniqueness is probabilistic; `create`
    /// surfaces the store's duplicate-key error on collision.
    fn generate_key(&self) -> String {
        let millis = Utc::now().timestamp_millis();
        let salt: u32 = rand::thread_rng().gen_range(0..100_000);
        format!("{millis}{salt}")
    }

    fn record_key(&self, record: &Record) -> Option<String> {
        record
            .get(&self.state.key_field)
            .and_then(bson::Bson::as_str)
            .map(str::to_string)
    }

    fn require_key(&self, record: &Record) -> KeyformResult<String> {
        self.record_key(record).ok_or_else(|| {
            KeyformError::Store(format!(
                "record in {} is missing its key field '{}'",
                self.state.collection, self.state.key_field
            ))
        })
    }

    fn not_found(&self, target: &str) -> KeyformError {
        KeyformError::NotFound(target.to_string(), self.state.collection.clone())
    }

    async fn is_pending_delete(&self, key: &str) -> bool {
        self.state
            .pending_deletes
            .read()
            .await
            .contains(key)
    }

    /// Scans the collection and drops records whose key is pending deletion,
    /// before any predicate evaluation.
    async fn live_records(&self, range: Option<KeyRange>) -> KeyformResult<Vec<Record>> {
        let records = self
            .store
            .get_all(&self.state.collection, range)
            .await?;
        let pending = self.state.pending_deletes.read().await;
        if pending.is_empty() {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .filter(|record| {
                self.record_key(record)
                    .is_none_or(|key| !pending.contains(&key))
            })
            .collect())
    }

    async fn apply_update(&self, existing: Record, patch: &Record) -> KeyformResult<Document<'a, B>> {
        let key = self.require_key(&existing)?;
        let mut merged = existing;
        for (field, value) in patch {
            merged.insert(field.clone(), value.clone());
        }
        let mut prepared = self.prepare(&merged)?;
        // The original primary key always wins, even against a patch that
        // tried to change it.
        prepared.insert(self.state.key_field.clone(), key.clone());
        self.store
            .put(&self.state.collection, prepared.clone())
            .await?;
        debug!("updated record {key} in {}", self.state.collection);
        Ok(Document::clean(self.clone(), prepared))
    }

    /// Tombstones the keys immediately, then issues the physical deletes.
    /// Each tombstone is cleared only once the store confirms; a store-level
    /// failure is swallowed and the tombstone stays, keeping the record
    /// hidden from reads.
    async fn schedule_delete(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        {
            let mut pending = self.state.pending_deletes.write().await;
            pending.extend(keys.iter().cloned());
        }
        debug!(
            "scheduled {} deletion(s) in {}",
            keys.len(),
            self.state.collection
        );
        for key in keys {
            match self.store.delete(&self.state.collection, &key).await {
                Ok(()) => {
                    self.state
                        .pending_deletes
                        .write()
                        .await
                        .remove(&key);
                }
                Err(err) => {
                    warn!(
                        "deletion of {key} in {} failed, record stays hidden: {err}",
                        self.state.collection
                    );
                }
            }
        }
    }
}

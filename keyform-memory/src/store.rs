//! In-memory implementation of the keyed-record store contract.
//!
//! Records live in per-collection `BTreeMap`s keyed by their primary key, so
//! bulk scans come back in ascending key order, and key ranges are a simple
//! filter over that order. Exact-match secondary indexes are tracked per
//! collection and uniqueness is enforced on every `add`/`put`.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use bson::Bson;
use mea::rwlock::RwLock;

use keyform_core::{
    error::{KeyformError, KeyformResult},
    store::{KeyRange, KeyedStore, KeyedStoreBuilder, Record},
};

#[derive(Debug)]
struct CollectionData {
    key_path: String,
    records: BTreeMap<String, Record>,
    /// Secondary indexes: field path -> uniqueness flag.
    indexes: HashMap<String, bool>,
}

impl CollectionData {
    fn new(key_path: String) -> Self {
        Self {
            key_path,
            records: BTreeMap::new(),
            indexes: HashMap::new(),
        }
    }
}

type StoreMap = HashMap<String, CollectionData>;

/// Thread-safe in-memory keyed-record store.
///
/// `MemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same underlying data across async tasks.
///
/// # Performance
///
/// Scans walk the whole collection and unique-index checks walk it again per
/// indexed field. Fine for development and test datasets; not intended for
/// large-scale production use.
#[derive(Default, Clone, Debug)]
pub struct MemoryStore {
    collections: Arc<RwLock<StoreMap>>,
}

impl MemoryStore {
    /// Creates a new empty store with no collections.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing a `MemoryStore`.
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }
}

/// Resolves a dotted field path against a record.
fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

fn extract_key(record: &Record, key_path: &str) -> KeyformResult<String> {
    lookup_path(record, key_path)
        .and_then(Bson::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            KeyformError::Store(format!("record carries no string key at '{key_path}'"))
        })
}

/// Returns the violated field, if storing `record` under `key` would break a
/// unique index.
fn unique_violation(data: &CollectionData, key: &str, record: &Record) -> Option<String> {
    for (field, unique) in &data.indexes {
        if !unique {
            continue;
        }
        let Some(value) = lookup_path(record, field) else {
            continue;
        };
        for (other_key, other) in &data.records {
            if other_key == key {
                continue;
            }
            if lookup_path(other, field) == Some(value) {
                return Some(field.clone());
            }
        }
    }
    None
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn create_collection(&self, name: &str, key_path: &str) -> KeyformResult<()> {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| CollectionData::new(key_path.to_string()));

        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> KeyformResult<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| KeyformError::CollectionNotFound(collection.to_string()))?;

        data.indexes
            .insert(field.to_string(), unique);

        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> KeyformResult<Option<Record>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|data| data.records.get(key))
            .cloned())
    }

    async fn get_all(
        &self,
        collection: &str,
        range: Option<KeyRange>,
    ) -> KeyformResult<Vec<Record>> {
        let collections = self.collections.read().await;
        let Some(data) = collections.get(collection) else {
            return Ok(vec![]);
        };

        Ok(data
            .records
            .iter()
            .filter(|(key, _)| {
                range
                    .as_ref()
                    .is_none_or(|range| range.contains(key.as_str()))
            })
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn add(&self, collection: &str, record: Record) -> KeyformResult<String> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| KeyformError::CollectionNotFound(collection.to_string()))?;

        let key = extract_key(&record, &data.key_path)?;
        if data.records.contains_key(&key) {
            return Err(KeyformError::DuplicateKey(key, collection.to_string()));
        }
        if let Some(field) = unique_violation(data, &key, &record) {
            return Err(KeyformError::Store(format!(
                "unique index '{field}' violated in collection {collection}"
            )));
        }

        data.records.insert(key.clone(), record);

        Ok(key)
    }

    async fn put(&self, collection: &str, record: Record) -> KeyformResult<String> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| KeyformError::CollectionNotFound(collection.to_string()))?;

        let key = extract_key(&record, &data.key_path)?;
        if let Some(field) = unique_violation(data, &key, &record) {
            return Err(KeyformError::Store(format!(
                "unique index '{field}' violated in collection {collection}"
            )));
        }

        data.records.insert(key.clone(), record);

        Ok(key)
    }

    async fn delete(&self, collection: &str, key: &str) -> KeyformResult<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| KeyformError::CollectionNotFound(collection.to_string()))?;

        // Deleting an absent key still completes successfully.
        data.records.remove(key);

        Ok(())
    }

    async fn clear(&self, collection: &str) -> KeyformResult<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| KeyformError::CollectionNotFound(collection.to_string()))?;

        data.records.clear();

        Ok(())
    }
}

/// Builder for constructing [`MemoryStore`] instances.
///
/// Currently a no-op builder, kept so callers can construct the store
/// through the same factory seam as other backends.
#[derive(Default)]
pub struct MemoryStoreBuilder;

#[async_trait]
impl KeyedStoreBuilder for MemoryStoreBuilder {
    type Store = MemoryStore;

    /// Builds and returns a new [`MemoryStore`] instance. Always succeeds.
    async fn build(self) -> KeyformResult<Self::Store> {
        Ok(MemoryStore::new())
    }
}

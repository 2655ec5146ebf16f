//! The keyed-record store capability contract.
//!
//! This module defines the trait that abstracts over the underlying
//! transactional store. The store speaks a deliberately narrow vocabulary —
//! point lookups, ordered key-range scans, add/put/delete/clear, and
//! exact-match secondary indexes — and everything richer (schemas, query
//! predicates, soft deletes) is layered on top by the model orchestrator.
//!
//! # Overview
//!
//! The [`KeyedStore`] trait provides a unified async interface for record
//! storage. Every method is one store transaction: the model layer never
//! reuses a transaction across calls, so implementations are free to open
//! and commit per invocation. Implementations are required to be thread-safe
//! (`Send + Sync`).
//!
//! # Examples
//!
//! ```ignore
//! use keyform_core::store::{KeyedStore, KeyRange};
//! use bson::doc;
//!
//! let store = MyStoreImpl::new();
//! store.create_collection("users", "id").await?;
//! store.put("users", doc! { "id": "u1", "name": "Alice" }).await?;
//! let all = store.get_all("users", None).await?;
//! # Ok::<(), keyform_core::error::KeyformError>(())
//! ```

use async_trait::async_trait;
use std::{fmt::Debug, ops::Bound};

use crate::error::KeyformResult;

/// A single stored record: a field-to-value mapping. Every persisted record
/// carries its primary key under the owning collection's key path.
pub type Record = bson::Document;

/// A closed, half-open or single-key interval over primary keys, used to
/// bound bulk scans.
///
/// Keys compare lexicographically. An unbounded side matches everything on
/// that side.
#[derive(Debug, Clone)]
pub struct KeyRange {
    start: Bound<String>,
    end: Bound<String>,
}

impl KeyRange {
    /// A range matching exactly one key.
    pub fn only(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            start: Bound::Included(key.clone()),
            end: Bound::Included(key),
        }
    }

    /// A range matching every key greater than or equal to `key`.
    pub fn at_least(key: impl Into<String>) -> Self {
        Self {
            start: Bound::Included(key.into()),
            end: Bound::Unbounded,
        }
    }

    /// A range matching every key less than or equal to `key`.
    pub fn at_most(key: impl Into<String>) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Included(key.into()),
        }
    }

    /// A range matching every key between `low` and `high`, inclusive on
    /// both sides.
    pub fn between(low: impl Into<String>, high: impl Into<String>) -> Self {
        Self {
            start: Bound::Included(low.into()),
            end: Bound::Included(high.into()),
        }
    }

    /// Returns whether the given key falls inside this range.
    pub fn contains(&self, key: &str) -> bool {
        let above_start = match &self.start {
            Bound::Included(start) => key >= start.as_str(),
            Bound::Excluded(start) => key > start.as_str(),
            Bound::Unbounded => true,
        };
        let below_end = match &self.end {
            Bound::Included(end) => key <= end.as_str(),
            Bound::Excluded(end) => key < end.as_str(),
            Bound::Unbounded => true,
        };
        above_start && below_end
    }
}

/// Abstract interface for transactional keyed-record stores.
///
/// Implementers provide the storage primitives the model layer builds on.
/// Each method completes asynchronously with success or an opaque error; the
/// model layer relays store errors unmodified and never retries.
#[async_trait]
pub trait KeyedStore: Send + Sync + Debug {
    /// Creates a collection whose records are keyed by the field at
    /// `key_path`. Creating an already-existing collection is a no-op.
    async fn create_collection(&self, name: &str, key_path: &str) -> KeyformResult<()>;

    /// Creates an exact-match secondary index over `field`, enforcing
    /// uniqueness when `unique` is set.
    async fn create_index(&self, collection: &str, field: &str, unique: bool)
    -> KeyformResult<()>;

    /// Point lookup. Returns `Ok(None)` when the key is absent.
    async fn get(&self, collection: &str, key: &str) -> KeyformResult<Option<Record>>;

    /// Bulk scan in ascending key order, optionally bounded by `range`.
    async fn get_all(
        &self,
        collection: &str,
        range: Option<KeyRange>,
    ) -> KeyformResult<Vec<Record>>;

    /// Inserts a new record, failing when a record with the same key already
    /// exists. Returns the stored key.
    async fn add(&self, collection: &str, record: Record) -> KeyformResult<String>;

    /// Inserts or overwrites a record (idempotent upsert). Returns the
    /// stored key.
    async fn put(&self, collection: &str, record: Record) -> KeyformResult<String>;

    /// Deletes the record at `key`. Deleting an absent key completes
    /// successfully.
    async fn delete(&self, collection: &str, key: &str) -> KeyformResult<()>;

    /// Removes every record in the collection.
    async fn clear(&self, collection: &str) -> KeyformResult<()>;
}

#[async_trait]
impl<B> KeyedStore for &B
where
    B: KeyedStore,
{
    async fn create_collection(&self, name: &str, key_path: &str) -> KeyformResult<()> {
        (*self)
            .create_collection(name, key_path)
            .await
    }

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> KeyformResult<()> {
        (*self)
            .create_index(collection, field, unique)
            .await
    }

    async fn get(&self, collection: &str, key: &str) -> KeyformResult<Option<Record>> {
        (*self).get(collection, key).await
    }

    async fn get_all(
        &self,
        collection: &str,
        range: Option<KeyRange>,
    ) -> KeyformResult<Vec<Record>> {
        (*self).get_all(collection, range).await
    }

    async fn add(&self, collection: &str, record: Record) -> KeyformResult<String> {
        (*self).add(collection, record).await
    }

    async fn put(&self, collection: &str, record: Record) -> KeyformResult<String> {
        (*self).put(collection, record).await
    }

    async fn delete(&self, collection: &str, key: &str) -> KeyformResult<()> {
        (*self).delete(collection, key).await
    }

    async fn clear(&self, collection: &str) -> KeyformResult<()> {
        (*self).clear(collection).await
    }
}

/// Factory trait for constructing store instances.
#[async_trait]
pub trait KeyedStoreBuilder {
    type Store: KeyedStore;

    async fn build(self) -> KeyformResult<Self::Store>;
}

#[cfg(test)]
mod tests {
    use super::KeyRange;

    #[test]
    fn range_bounds() {
        assert!(KeyRange::only("b").contains("b"));
        assert!(!KeyRange::only("b").contains("a"));
        assert!(KeyRange::at_least("b").contains("z"));
        assert!(!KeyRange::at_least("b").contains("a"));
        assert!(KeyRange::at_most("b").contains("a"));
        assert!(!KeyRange::at_most("b").contains("c"));
        assert!(KeyRange::between("b", "d").contains("c"));
        assert!(!KeyRange::between("b", "d").contains("e"));
    }
}

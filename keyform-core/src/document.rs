//! Mutable, dirty-tracking views over stored records.
//!
//! Every model read or write that yields data wraps it in a [`Document`]: one
//! cast-and-validated record, a dirty flag, and a handle to the owning model.
//! Field access goes through explicit accessors validated against the
//! schema's declared field set — the primary key is read-only, and any
//! successful mutation marks the document dirty until the next
//! [`Document::save`].

use std::fmt;

use bson::Bson;
use serde_json::Value;

use crate::{
    error::{KeyformError, KeyformResult},
    model::Model,
    store::{KeyedStore, Record},
};

/// A mutable view over exactly one stored record.
///
/// Documents are created per operation result and are not tracked anywhere;
/// dropping one loses nothing but unsaved mutations.
#[derive(Debug)]
pub struct Document<'a, B: KeyedStore> {
    model: Model<'a, B>,
    record: Record,
    dirty: bool,
}

impl<'a, B: KeyedStore> Document<'a, B> {
    /// Wraps a record fresh from the store or the write pipeline: not dirty.
    pub(crate) fn clean(model: Model<'a, B>, record: Record) -> Self {
        Self {
            model,
            record,
            dirty: false,
        }
    }

    /// The model this document belongs to.
    pub fn model(&self) -> &Model<'a, B> {
        &self.model
    }

    /// The document's primary key, if assigned.
    pub fn key(&self) -> Option<&str> {
        self.record
            .get(self.model.key_field())
            .and_then(Bson::as_str)
    }

    /// Reads a field value. Absent fields — including fields outside the
    /// schema — read as `None`.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.record.get(field)
    }

    /// Writes a field value and marks the document dirty.
    ///
    /// # Errors
    ///
    /// [`KeyformError::Validation`] when `field` is the primary key (which
    /// is immutable once assigned) or is not declared by the schema.
    pub fn set(&mut self, field: &str, value: impl Into<Bson>) -> KeyformResult<()> {
        if field == self.model.key_field() {
            return Err(KeyformError::Validation {
                path: field.to_string(),
                message: "the primary key is read-only".to_string(),
            });
        }
        if !self.model.schema().has_field(field) {
            return Err(KeyformError::Validation {
                path: field.to_string(),
                message: "not a schema-declared field".to_string(),
            });
        }
        self.record
            .insert(field.to_string(), value.into());
        self.dirty = true;
        Ok(())
    }

    /// Whether the document holds unsaved mutations.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persists unsaved mutations through the model's upsert path, keyed on
    /// this document's own primary key. A no-op when the document is clean.
    ///
    /// On success the internal record is replaced with the stored value and
    /// the dirty flag clears.
    pub async fn save(&mut self) -> KeyformResult<&mut Self> {
        if !self.dirty {
            return Ok(self);
        }
        let key = self
            .key()
            .map(str::to_string)
            .ok_or_else(|| KeyformError::Store("document has no primary key".to_string()))?;
        let saved = self
            .model
            .insert_one(self.record.clone(), Some(&key))
            .await?;
        self.record = saved.into_record();
        self.dirty = false;
        Ok(self)
    }

    /// The plain record, for interchange.
    pub fn as_record(&self) -> &Record {
        &self.record
    }

    /// Consumes the document, yielding its record.
    pub fn into_record(self) -> Record {
        self.record
    }

    /// The plain record as a JSON value, for interchange.
    pub fn to_json(&self) -> KeyformResult<Value> {
        Ok(serde_json::to_value(&self.record)?)
    }
}

impl<'a, B: KeyedStore> fmt::Display for Document<'a, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record)
    }
}

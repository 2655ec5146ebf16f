//! Convenient re-exports of commonly used types from keyform.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use keyform::prelude::*;
//! ```

pub use keyform_core::{
    document::Document,
    error::{KeyformError, KeyformResult},
    model::Model,
    query::QueryOp,
    schema::{FieldType, IndexSpec, Schema, SchemaNode, Validator},
    session::{DEFAULT_KEY_FIELD, Session},
    store::{KeyRange, KeyedStore, KeyedStoreBuilder, Record},
};

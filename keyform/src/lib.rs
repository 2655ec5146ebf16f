//! Main keyform crate providing a schema-validating model layer over
//! transactional keyed-record stores.
//!
//! This crate is the primary entry point for users of the keyform framework.
//! It re-exports the core types from `keyform-core` and bundles the
//! in-memory store backend.
//!
//! # Features
//!
//! - **Declarative schemas** - Field templates compiled into validating schema trees
//! - **Rich queries over plain stores** - Comparison, membership and regex predicates evaluated in memory
//! - **Validated CRUD** - Every write passes validate → cast before the store sees it
//! - **Soft deletes** - Scheduled deletions are hidden from reads before the store confirms removal
//!
//! # Quick Start
//!
//! ```ignore
//! use keyform::{memory::MemoryStore, prelude::*};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> KeyformResult<()> {
//!     let session = Session::new(MemoryStore::new());
//!     let users = session.define("users", &doc! {
//!         "name": { "type": "string", "required": true },
//!         "email": { "type": "string", "unique": true },
//!         "age": { "type": "number", "minValue": 18 },
//!     })?;
//!     session.provision().await?;
//!
//!     // Create a record; the key is generated when absent.
//!     let ann = users.create(doc! {
//!         "name": "Ann",
//!         "email": "ann@example.com",
//!         "age": 32,
//!     }).await?;
//!     println!("created {}", ann.key().unwrap_or_default());
//!
//!     // Query with operator predicates.
//!     let adults = users.find(&doc! { "age": { "$gte": 21 } }).await?;
//!     println!("{} adult(s)", adults.len());
//!
//!     // Mutate through a document view and save it back.
//!     let mut ann = users.find_one(&doc! { "name": "Ann" }).await?.unwrap();
//!     ann.set("age", 33)?;
//!     ann.save().await?;
//!
//!     // Deletions are hidden from reads immediately.
//!     users.delete_many(&doc! { "age": { "$lt": 40 } }).await?;
//!     assert!(users.find(&doc! {}).await?.is_empty());
//!
//!     Ok(())
//! }
//! ```

pub mod prelude;

pub use keyform_core::{document, error, model, query, schema, session, store};

// Re-export BSON types for convenience
pub use bson;

/// In-memory store backend implementations.
pub mod memory {
    pub use keyform_memory::{MemoryStore, MemoryStoreBuilder};
}

//! A schema-validating model layer over transactional keyed-record stores.
//!
//! This crate is the core of the keyform project and provides:
//!
//! - **Schema compilation** ([`schema`]) - Declarative field templates compiled into immutable, validating schema trees
//! - **Query matching** ([`query`]) - In-memory predicate evaluation with a fixed comparison/membership/regex operator set
//! - **Model orchestration** ([`model`]) - Validated CRUD against the store, key generation, and the soft-delete cache
//! - **Document views** ([`document`]) - Mutable, dirty-tracking views over single records
//! - **Sessions** ([`session`]) - Connection-owned model registry and index provisioning
//! - **Store capability contract** ([`store`]) - The trait for the underlying transactional keyed store
//! - **Error handling** ([`error`]) - Error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use keyform_core::session::Session;
//! use bson::doc;
//!
//! let session = Session::new(store);
//! let users = session.define("users", &doc! {
//!     "name": { "type": "string", "required": true },
//!     "age": { "type": "number", "minValue": 18 },
//! })?;
//! session.provision().await?;
//!
//! let ann = users.create(doc! { "name": "Ann", "age": 32 }).await?;
//! let adults = users.find(&doc! { "age": { "$gte": 21 } }).await?;
//! ```

pub mod document;
pub mod error;
pub mod model;
pub mod query;
pub mod schema;
pub mod session;
pub mod store;

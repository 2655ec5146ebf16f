//! In-memory keyed-record store for keyform.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! `KeyedStore` capability contract. It uses async-aware read-write locks
//! for concurrent access and is ideal for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Ordered key scans** - Records kept in ascending key order, with key-range bounds
//! - **Unique indexes** - Exact-match secondary indexes with uniqueness enforcement
//!
//! # Quick Start
//!
//! ```ignore
//! use keyform_core::session::Session;
//! use keyform_memory::MemoryStore;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(MemoryStore::new());
//!     let users = session.define("users", &doc! { "name": "string" })?;
//!     session.provision().await?;
//!
//!     users.create(doc! { "name": "Alice" }).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod store;

pub use store::{MemoryStore, MemoryStoreBuilder};

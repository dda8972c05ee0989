// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store integration.
//!
//! Defines the five operations the replicator needs from any document store
//! (source or destination) and the concrete backends that provide them.
//!
//! | Backend | Module | Credential blob |
//! |---------|--------|-----------------|
//! | in-memory | [`memory`] | `memory://` |
//! | SQLite | [`sqlite`] | `sqlite:///var/lib/app/docs.db` |
//! | Redis | [`redis`] | `redis://host:6379` |
//!
//! Every connected store is wrapped in a [`guarded::GuardedStore`] which adds
//! per-call deadlines, retry, a circuit breaker and optional write rate limiting.
//!
//! # Example
//!
//! ```rust,no_run
//! use fanout_replicator::store::{BoxFuture, DocumentStore};
//! use fanout_replicator::path::{CollectionPath, DocumentPath};
//! use fanout_replicator::value::Fields;
//!
//! struct Blackhole;
//!
//! impl DocumentStore for Blackhole {
//!     fn name(&self) -> &str {
//!         "blackhole"
//!     }
//!
//!     fn get<'a>(&'a self, _path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
//!         Box::pin(async { Ok(None) })
//!     }
//!
//!     fn set_merge<'a>(&'a self, _path: &'a DocumentPath, _fields: Fields) -> BoxFuture<'a, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//!
//!     fn delete<'a>(&'a self, _path: &'a DocumentPath) -> BoxFuture<'a, ()> {
//!         Box::pin(async { Ok(()) })
//!     }
//!
//!     fn list_documents<'a>(&'a self, _collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//!
//!     fn list_collections<'a>(&'a self, _document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
//!         Box::pin(async { Ok(vec![]) })
//!     }
//! }
//! ```

pub mod guarded;
pub mod memory;
pub mod redis;
pub mod spec;
pub mod sqlite;

use crate::error::Result;
use crate::path::{CollectionPath, DocumentPath};
use crate::value::Fields;
use std::future::Future;
use std::pin::Pin;

pub use guarded::GuardedStore;
pub use memory::MemoryStore;
pub use spec::StoreSpec;
pub use sqlite::SqliteStore;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What the replicator needs from a document store.
///
/// Implementations must give per-document atomicity for `set_merge`: two
/// concurrent merges into the same document must not lose each other's fields.
/// The log processor relies on this to flip one entry's `processed` flag
/// without clobbering its siblings.
pub trait DocumentStore: Send + Sync + 'static {
    /// Label used in logs, metrics and errors.
    fn name(&self) -> &str;

    /// Read a document's fields. `None` if the document does not exist.
    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>>;

    /// Merge-write fields into a document, creating it if needed.
    ///
    /// See [`crate::value::merge_fields`] for the merge rules.
    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()>;

    /// Delete a document. Deleting a missing document is not an error.
    ///
    /// Sub-collections under the document are left alone.
    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()>;

    /// Ids of the documents in a collection, sorted.
    ///
    /// Includes placeholder documents that have no fields but own
    /// sub-collections.
    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>>;

    /// Names of the sub-collections directly under a document, sorted.
    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>>;
}

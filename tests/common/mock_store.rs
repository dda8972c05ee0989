// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recording document store for testing.
//!
//! Wraps a [`MemoryStore`] and records every mutation for assertions.
//! Can be configured to fail writes under given paths, fail every call, or
//! delay every call.

use fanout_replicator::error::ReplicationError;
use fanout_replicator::path::{CollectionPath, DocumentPath};
use fanout_replicator::store::{BoxFuture, DocumentStore, MemoryStore};
use fanout_replicator::value::Fields;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// A recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetMerge(String),
    Delete(String),
}

impl Mutation {
    pub fn path(&self) -> &str {
        match self {
            Mutation::SetMerge(p) | Mutation::Delete(p) => p,
        }
    }
}

/// Mock implementation of DocumentStore that records all mutations.
///
/// # Example
/// ```rust,ignore
/// let store = RecordingStore::new("eu-west");
///
/// // Writes under orders/A2 fail
/// store.fail_writes_under("orders/A2").await;
///
/// // Use in tests...
///
/// // Assert what was written
/// assert_eq!(store.mutations().await.len(), 3);
/// ```
pub struct RecordingStore {
    inner: MemoryStore,
    /// Recorded set_merge()/delete() calls, successful or not
    mutations: RwLock<Vec<Mutation>>,
    /// Writes at or below these paths fail permanently
    failing_prefixes: RwLock<Vec<String>>,
    /// Every call fails with a transient error
    down: AtomicBool,
    /// Every call sleeps this long first
    delay: Option<Duration>,
    /// Total calls of any kind
    calls: AtomicUsize,
}

impl RecordingStore {
    /// Create a healthy store.
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryStore::new(name),
            mutations: RwLock::new(Vec::new()),
            failing_prefixes: RwLock::new(Vec::new()),
            down: AtomicBool::new(false),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a store whose every call fails with a transient error.
    pub fn down(name: &str) -> Self {
        let store = Self::new(name);
        store.down.store(true, Ordering::SeqCst);
        store
    }

    /// Create a store whose every call takes `delay`.
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(name)
        }
    }

    /// Make writes to `prefix` (and everything beneath it) fail.
    pub async fn fail_writes_under(&self, prefix: &str) {
        self.failing_prefixes.write().await.push(prefix.to_string());
    }

    /// Bring a down store back.
    pub async fn recover(&self) {
        self.down.store(false, Ordering::SeqCst);
        self.failing_prefixes.write().await.clear();
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.mutations.read().await.clone()
    }

    pub async fn clear_mutations(&self) {
        self.mutations.write().await.clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Fields> {
        self.inner.snapshot().await
    }

    /// Write straight into the backing store without recording.
    pub async fn seed(&self, path: &str, fields: Fields) {
        self.inner
            .set_merge(&path.parse().expect("seed path"), fields)
            .await
            .expect("seed write");
    }

    async fn enter(&self, operation: &str, path: &str) -> Result<(), ReplicationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(ReplicationError::transient(
                self.inner.name(),
                operation,
                path,
                "connection refused",
            ));
        }
        Ok(())
    }

    async fn check_write(&self, operation: &str, path: &str) -> Result<(), ReplicationError> {
        let prefixes = self.failing_prefixes.read().await;
        let blocked = prefixes
            .iter()
            .any(|p| path == p || path.starts_with(&format!("{}/", p)));
        if blocked {
            return Err(ReplicationError::store(
                self.inner.name(),
                operation,
                path,
                "write rejected",
            ));
        }
        Ok(())
    }
}

impl DocumentStore for RecordingStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
        Box::pin(async move {
            self.enter("get", &path.to_string()).await?;
            self.inner.get(path).await
        })
    }

    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let rendered = path.to_string();
            self.enter("set_merge", &rendered).await?;
            self.mutations
                .write()
                .await
                .push(Mutation::SetMerge(rendered.clone()));
            self.check_write("set_merge", &rendered).await?;
            self.inner.set_merge(path, fields).await
        })
    }

    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let rendered = path.to_string();
            self.enter("delete", &rendered).await?;
            self.mutations
                .write()
                .await
                .push(Mutation::Delete(rendered.clone()));
            self.check_write("delete", &rendered).await?;
            self.inner.delete(path).await
        })
    }

    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.enter("list_documents", &collection.to_string()).await?;
            self.inner.list_documents(collection).await
        })
    }

    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.enter("list_collections", &document.to_string()).await?;
            self.inner.list_collections(document).await
        })
    }
}

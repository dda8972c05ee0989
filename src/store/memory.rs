// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory document store.
//!
//! Used for tests, dry runs (`memory://` destinations discard everything at
//! exit) and as the reference behavior the persistent backends must match.

use super::{BoxFuture, DocumentStore};
use crate::path::{child_segments, prefix_bounds, CollectionPath, DocumentPath};
use crate::value::{merge_fields, Fields};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::trace;

/// Document store held entirely in process memory.
///
/// Documents are keyed by their rendered path, so prefix scans over the
/// `BTreeMap` give collection and sub-collection listings.
pub struct MemoryStore {
    name: String,
    docs: RwLock<BTreeMap<String, Fields>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Copy of every stored document, keyed by path.
    pub async fn snapshot(&self) -> BTreeMap<String, Fields> {
        self.docs.read().await.clone()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    async fn children(&self, prefix: String) -> Vec<String> {
        let docs = self.docs.read().await;
        let (lo, hi) = prefix_bounds(&prefix);
        child_segments(&prefix, docs.range(lo..hi).map(|(k, _)| k.as_str()))
    }
}

impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
        Box::pin(async move { Ok(self.docs.read().await.get(&path.to_string()).cloned()) })
    }

    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            trace!(store = %self.name, path = %path, fields = fields.len(), "memory set_merge");
            let mut docs = self.docs.write().await;
            merge_fields(docs.entry(path.to_string()).or_default(), fields);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.docs.write().await.remove(&path.to_string());
            Ok(())
        })
    }

    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(self.children(collection.to_string()).await) })
    }

    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(self.children(document.to_string()).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        serde_json::from_value(v).unwrap()
    }

    fn doc(s: &str) -> DocumentPath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = MemoryStore::new("mem");
        assert!(store.get(&doc("orders/A1")).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_merge_creates_then_merges() {
        let store = MemoryStore::new("mem");
        let p = doc("orders/A1");
        store.set_merge(&p, fields(json!({"status": "new", "n": 1}))).await.unwrap();
        store.set_merge(&p, fields(json!({"status": "paid"}))).await.unwrap();
        assert_eq!(
            store.get(&p).await.unwrap().unwrap(),
            fields(json!({"status": "paid", "n": 1}))
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let store = MemoryStore::new("mem");
        store.delete(&doc("orders/nope")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_keeps_sub_collections() {
        let store = MemoryStore::new("mem");
        store.set_merge(&doc("orders/A1"), fields(json!({"a": 1}))).await.unwrap();
        store.set_merge(&doc("orders/A1/items/i1"), fields(json!({"q": 2}))).await.unwrap();
        store.delete(&doc("orders/A1")).await.unwrap();

        assert!(store.get(&doc("orders/A1")).await.unwrap().is_none());
        assert!(store.get(&doc("orders/A1/items/i1")).await.unwrap().is_some());
        // A1 is now a placeholder
        let orders = CollectionPath::root("orders").unwrap();
        assert_eq!(store.list_documents(&orders).await.unwrap(), vec!["A1".to_string()]);
    }

    #[tokio::test]
    async fn test_listings() {
        let store = MemoryStore::new("mem");
        for p in ["orders/A1", "orders/A2", "orders/A1/items/i1", "orders/A1/notes/n1", "users/u1"] {
            store.set_merge(&doc(p), fields(json!({"x": 1}))).await.unwrap();
        }
        let orders = CollectionPath::root("orders").unwrap();
        assert_eq!(
            store.list_documents(&orders).await.unwrap(),
            vec!["A1".to_string(), "A2".to_string()]
        );
        assert_eq!(
            store.list_collections(&doc("orders/A1")).await.unwrap(),
            vec!["items".to_string(), "notes".to_string()]
        );
        assert!(store.list_collections(&doc("orders/A2")).await.unwrap().is_empty());
        let items: CollectionPath = "orders/A1/items".parse().unwrap();
        assert_eq!(store.list_documents(&items).await.unwrap(), vec!["i1".to_string()]);
    }
}

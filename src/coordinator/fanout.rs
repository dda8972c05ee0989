// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fan-out: one log entry applied to every destination.
//!
//! Per destination, independently:
//!
//! | Entry | Action |
//! |-------|--------|
//! | `delete` with `doc` | delete that document |
//! | `create`/`update` with `doc` | copy the document tree if the source document exists |
//! | no `doc` | copy the whole collection |
//!
//! A failure on one destination is logged and recorded in its
//! [`DestinationOutcome`]; the remaining destinations still run. With
//! `fanout.parallel` the destinations run concurrently, bounded by a
//! [`Bulkhead`]. Outcomes are returned in destination name order either way.

use super::types::{Applied, DestinationOutcome, FanoutOutcome};
use crate::collection::copy_collection;
use crate::config::FanoutConfig;
use crate::error::{ReplicationError, Result};
use crate::log::{LogEntry, OpType};
use crate::metrics;
use crate::path::DocumentPath;
use crate::registry::{Destination, DestinationRegistry};
use crate::resilience::Bulkhead;
use crate::store::DocumentStore;
use crate::tree::copy_document_tree;
use futures::future::join_all;
use std::time::Instant;
use tracing::{debug, warn};

/// Apply `entry` to every destination in `registry`.
pub async fn apply(
    entry: &LogEntry,
    source: &dyn DocumentStore,
    registry: &DestinationRegistry,
    config: &FanoutConfig,
) -> FanoutOutcome {
    let destinations: Vec<&Destination> = registry.iter().collect();
    apply_to_each(entry, source, &destinations, config).await
}

/// Apply `entry` to the given destinations only.
pub async fn apply_to_each(
    entry: &LogEntry,
    source: &dyn DocumentStore,
    destinations: &[&Destination],
    config: &FanoutConfig,
) -> FanoutOutcome {
    let outcomes = if config.parallel && destinations.len() > 1 {
        let bulkhead = Bulkhead::new(config.concurrency_for(destinations.len()));
        let bulkhead = &bulkhead;
        join_all(destinations.iter().map(|destination| async move {
            let _permit = match bulkhead.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    return DestinationOutcome {
                        destination: destination.name.clone(),
                        result: Err(ReplicationError::Internal(e.to_string())),
                    }
                }
            };
            apply_to(entry, source, destination).await
        }))
        .await
    } else {
        let mut outcomes = Vec::with_capacity(destinations.len());
        for destination in destinations {
            outcomes.push(apply_to(entry, source, destination).await);
        }
        outcomes
    };

    FanoutOutcome {
        entry_id: entry.id.clone(),
        outcomes,
    }
}

async fn apply_to(entry: &LogEntry, source: &dyn DocumentStore, destination: &Destination) -> DestinationOutcome {
    let start = Instant::now();
    let result = apply_one(entry, source, destination.store.as_ref()).await;

    match &result {
        Ok(applied) => {
            debug!(
                destination = %destination.name,
                entry_id = %entry.id,
                outcome = %applied,
                "Entry applied"
            );
            metrics::record_destination_apply(&destination.name, entry.op.as_str(), "applied", start.elapsed());
        }
        Err(e) => {
            warn!(
                destination = %destination.name,
                entry_id = %entry.id,
                collection = %entry.collection,
                doc = entry.doc.as_deref().unwrap_or("*"),
                error = %e,
                "Entry failed on destination, continuing with the others"
            );
            metrics::record_destination_apply(&destination.name, entry.op.as_str(), "failed", start.elapsed());
        }
    }

    DestinationOutcome {
        destination: destination.name.clone(),
        result,
    }
}

/// Apply one entry to one destination store.
pub async fn apply_one(entry: &LogEntry, source: &dyn DocumentStore, dest: &dyn DocumentStore) -> Result<Applied> {
    match (entry.op, entry.doc.as_deref()) {
        (OpType::Delete, Some(id)) => {
            let path = DocumentPath::new(entry.collection.as_str(), id)?;
            dest.delete(&path).await?;
            Ok(Applied::Deleted)
        }
        (_, Some(id)) => {
            let path = DocumentPath::new(entry.collection.as_str(), id)?;
            if source.get(&path).await?.is_none() {
                return Ok(Applied::SourceMissing);
            }
            let stats = copy_document_tree(source, dest, &path, &path).await?;
            metrics::record_documents_copied(dest.name(), stats.written);
            Ok(Applied::TreeCopied(stats))
        }
        // A collection-wide delete is not supported; it replays the collection.
        (_, None) => {
            let copied = copy_collection(source, dest, &entry.collection)
                .await?
                .into_result(dest.name())?;
            Ok(Applied::CollectionCopied { copied })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::CollectionPath;
    use crate::store::{BoxFuture, MemoryStore};
    use crate::value::Fields;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fields(v: serde_json::Value) -> Fields {
        serde_json::from_value(v).unwrap()
    }

    fn entry(collection: &str, doc: Option<&str>, op: OpType) -> LogEntry {
        LogEntry {
            id: "log1".into(),
            collection: collection.into(),
            doc: doc.map(str::to_string),
            op,
            processed: false,
            applied_to: Default::default(),
        }
    }

    async fn source() -> MemoryStore {
        let source = MemoryStore::new("source");
        for (p, v) in [
            ("orders/A1", json!({"status": "paid"})),
            ("orders/A1/items/i1", json!({"qty": 2})),
            ("orders/A2", json!({"status": "new"})),
        ] {
            source.set_merge(&p.parse().unwrap(), fields(v)).await.unwrap();
        }
        source
    }

    /// Fails every call.
    struct Down;

    impl DocumentStore for Down {
        fn name(&self) -> &str {
            "down"
        }
        fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
            Box::pin(async move { Err(ReplicationError::transient("down", "get", path.to_string(), "refused")) })
        }
        fn set_merge<'a>(&'a self, path: &'a DocumentPath, _fields: Fields) -> BoxFuture<'a, ()> {
            Box::pin(async move { Err(ReplicationError::transient("down", "set_merge", path.to_string(), "refused")) })
        }
        fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
            Box::pin(async move { Err(ReplicationError::transient("down", "delete", path.to_string(), "refused")) })
        }
        fn list_documents<'a>(&'a self, c: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
            Box::pin(async move { Err(ReplicationError::transient("down", "list_documents", c.to_string(), "refused")) })
        }
        fn list_collections<'a>(&'a self, d: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
            Box::pin(async move {
                Err(ReplicationError::transient("down", "list_collections", d.to_string(), "refused"))
            })
        }
    }

    /// Slow writes that track how many are in flight at once.
    struct Slow {
        inner: MemoryStore,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl DocumentStore for Slow {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
            self.inner.get(path)
        }
        fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.inner.set_merge(path, fields).await
            })
        }
        fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
            self.inner.delete(path)
        }
        fn list_documents<'a>(&'a self, c: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
            self.inner.list_documents(c)
        }
        fn list_collections<'a>(&'a self, d: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
            self.inner.list_collections(d)
        }
    }

    fn memory_registry(names: &[&str]) -> (DestinationRegistry, Vec<Arc<MemoryStore>>) {
        let stores: Vec<Arc<MemoryStore>> = names.iter().map(|n| Arc::new(MemoryStore::new(*n))).collect();
        let registry = DestinationRegistry::from_stores(
            stores
                .iter()
                .map(|s| (s.name().to_string(), s.clone() as Arc<dyn DocumentStore>)),
        );
        (registry, stores)
    }

    #[tokio::test]
    async fn test_update_copies_tree_to_every_destination() {
        let source = source().await;
        let (registry, stores) = memory_registry(&["a", "b"]);

        let outcome = apply(
            &entry("orders", Some("A1"), OpType::Update),
            &source,
            &registry,
            &FanoutConfig::default(),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.outcomes.len(), 2);
        for store in stores {
            let copied = store.snapshot().await;
            assert_eq!(copied.len(), 2);
            assert!(copied.contains_key("orders/A1/items/i1"));
        }
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let source = source().await;
        let dest = MemoryStore::new("dest");
        dest.set_merge(&"orders/A1".parse().unwrap(), fields(json!({"x": 1})))
            .await
            .unwrap();

        let applied = apply_one(&entry("orders", Some("A1"), OpType::Delete), &source, &dest)
            .await
            .unwrap();

        assert_eq!(applied, Applied::Deleted);
        assert!(dest.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_of_missing_document_is_noop() {
        let source = MemoryStore::new("source");
        let dest = MemoryStore::new("dest");
        let applied = apply_one(&entry("orders", Some("nope"), OpType::Delete), &source, &dest)
            .await
            .unwrap();
        assert_eq!(applied, Applied::Deleted);
    }

    #[tokio::test]
    async fn test_missing_source_document_is_noop() {
        let source = source().await;
        let dest = MemoryStore::new("dest");
        let applied = apply_one(&entry("orders", Some("A9"), OpType::Create), &source, &dest)
            .await
            .unwrap();
        assert_eq!(applied, Applied::SourceMissing);
        assert!(dest.is_empty().await);
    }

    #[tokio::test]
    async fn test_collection_wide_entry_copies_collection() {
        let source = source().await;
        let dest = MemoryStore::new("dest");
        let applied = apply_one(&entry("orders", None, OpType::Create), &source, &dest)
            .await
            .unwrap();
        assert_eq!(applied, Applied::CollectionCopied { copied: 2 });
        assert_eq!(dest.len().await, 3);
    }

    #[tokio::test]
    async fn test_collection_wide_delete_replays_collection() {
        let source = source().await;
        let dest = MemoryStore::new("dest");
        let applied = apply_one(&entry("orders", None, OpType::Delete), &source, &dest)
            .await
            .unwrap();
        assert_eq!(applied, Applied::CollectionCopied { copied: 2 });
    }

    #[tokio::test]
    async fn test_failed_destination_does_not_block_others() {
        let source = source().await;
        let good = Arc::new(MemoryStore::new("good"));
        let registry = DestinationRegistry::from_stores(vec![
            ("a-down".to_string(), Arc::new(Down) as Arc<dyn DocumentStore>),
            ("b-good".to_string(), good.clone() as Arc<dyn DocumentStore>),
        ]);

        for parallel in [false, true] {
            let outcome = apply(
                &entry("orders", Some("A2"), OpType::Update),
                &source,
                &registry,
                &FanoutConfig {
                    parallel,
                    max_concurrency: 0,
                },
            )
            .await;

            assert!(!outcome.is_success());
            let names: Vec<&str> = outcome.outcomes.iter().map(|o| o.destination.as_str()).collect();
            assert_eq!(names, vec!["a-down", "b-good"]);
            assert!(outcome.outcomes[0].result.is_err());
            assert!(outcome.outcomes[1].result.is_ok());
            assert!(good.snapshot().await.contains_key("orders/A2"));
        }
    }

    #[tokio::test]
    async fn test_no_destinations_is_success() {
        let source = source().await;
        let outcome = apply(
            &entry("orders", Some("A1"), OpType::Update),
            &source,
            &DestinationRegistry::empty(),
            &FanoutConfig::default(),
        )
        .await;
        assert!(outcome.is_success());
        assert!(outcome.outcomes.is_empty());
    }

    async fn run_slow_fanout(max_concurrency: usize) -> usize {
        let source = source().await;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let registry = DestinationRegistry::from_stores((0..4).map(|i| {
            let name = format!("d{}", i);
            let store = Slow {
                inner: MemoryStore::new(name.clone()),
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            };
            (name, Arc::new(store) as Arc<dyn DocumentStore>)
        }));

        let outcome = apply(
            &entry("orders", Some("A2"), OpType::Update),
            &source,
            &registry,
            &FanoutConfig {
                parallel: true,
                max_concurrency,
            },
        )
        .await;
        assert!(outcome.is_success());
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_parallel_fanout_runs_concurrently() {
        assert!(run_slow_fanout(0).await >= 2);
    }

    #[tokio::test]
    async fn test_parallel_fanout_respects_cap() {
        assert!(run_slow_fanout(2).await <= 2);
    }
}

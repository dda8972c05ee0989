// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for replication, chaos and integration tests.
//!
//! This module provides:
//! - Redis testcontainer setup
//! - A recording/failing document store
//! - Fixture helpers for documents, logs and registries

#![allow(dead_code)]

pub mod containers;
pub mod mock_store;

pub use mock_store::*;

use fanout_replicator::log::DateKey;
use fanout_replicator::path::DocumentPath;
use fanout_replicator::registry::DestinationRegistry;
use fanout_replicator::store::DocumentStore;
use fanout_replicator::value::{Fields, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a field map from JSON.
pub fn fields(v: serde_json::Value) -> Fields {
    serde_json::from_value(v).expect("fixture must be a JSON object")
}

/// Parse a document path.
pub fn doc(path: &str) -> DocumentPath {
    path.parse().expect("fixture path must be valid")
}

pub fn date(s: &str) -> DateKey {
    s.parse().expect("fixture date must be YYYY-MM-DD")
}

/// Merge-write every `(path, fields)` pair into `store`.
pub async fn seed(store: &dyn DocumentStore, docs: &[(&str, serde_json::Value)]) {
    for (path, value) in docs {
        store
            .set_merge(&doc(path), fields(value.clone()))
            .await
            .expect("seed write failed");
    }
}

/// Registry over recording stores, named after each store.
pub fn registry_of(stores: &[Arc<RecordingStore>]) -> DestinationRegistry {
    DestinationRegistry::from_stores(
        stores
            .iter()
            .map(|s| (s.name().to_string(), s.clone() as Arc<dyn DocumentStore>)),
    )
}

/// `processed` flag of every entry in the log record at `log_path`.
pub async fn processed_flags(store: &dyn DocumentStore, log_path: &str) -> BTreeMap<String, bool> {
    let record = store
        .get(&doc(log_path))
        .await
        .expect("log read failed")
        .unwrap_or_default();
    record
        .into_iter()
        .map(|(id, entry)| {
            let processed = entry
                .as_map()
                .and_then(|m| m.get("processed"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (id, processed)
        })
        .collect()
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use fanout_replicator::log::{natural_cmp, LogRecord};
use fanout_replicator::path::DocumentPath;
use fanout_replicator::store::{DocumentStore, MemoryStore};
use fanout_replicator::tree::{copy_document_tree, DocumentNode};
use fanout_replicator::value::{merge_fields, Fields, Value};
use proptest::prelude::*;
use std::cmp::Ordering;

// =============================================================================
// Strategies
// =============================================================================

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,8}"
}

fn leaf_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        ((i64::MAX as u64 + 1)..=u64::MAX).prop_map(Value::Unsigned),
        "[a-z ]{0,12}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf_value().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

fn fields() -> impl Strategy<Value = Fields> {
    prop::collection::btree_map("[a-e]{1,3}", value(), 0..5)
}

/// Relative document paths under `root/doc`, up to three levels deep.
///
/// Field maps are non-empty: an empty document is not written by the copier.
fn tree_paths() -> impl Strategy<Value = Vec<(Vec<(String, String)>, Fields)>> {
    prop::collection::vec(
        (
            prop::collection::vec(("[a-c]{1,2}", "[a-c0-9]{1,2}"), 0..3),
            prop::collection::btree_map("[a-e]{1,3}", value(), 1..5),
        ),
        1..8,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// =============================================================================
// Path Properties
// =============================================================================

proptest! {
    /// Rendering then parsing a document path gives the same path.
    #[test]
    fn document_path_roundtrip(pairs in prop::collection::vec((segment(), segment()), 1..5)) {
        let mut path = DocumentPath::new(pairs[0].0.as_str(), pairs[0].1.as_str()).unwrap();
        for (collection, id) in &pairs[1..] {
            path = path.child(collection, id).unwrap();
        }
        let parsed: DocumentPath = path.to_string().parse().unwrap();
        prop_assert_eq!(parsed.depth(), pairs.len());
        prop_assert_eq!(parsed, path);
    }

    /// Parsing arbitrary strings never panics.
    #[test]
    fn document_path_parse_never_panics(s in ".{0,40}") {
        let _ = s.parse::<DocumentPath>();
    }
}

// =============================================================================
// Natural Order Properties
// =============================================================================

proptest! {
    /// Natural comparison is reflexive.
    #[test]
    fn natural_cmp_reflexive(a in "[a-z0-9]{0,10}") {
        prop_assert_eq!(natural_cmp(&a, &a), Ordering::Equal);
    }

    /// Natural comparison is antisymmetric.
    #[test]
    fn natural_cmp_antisymmetric(a in "[a-z0-9]{0,10}", b in "[a-z0-9]{0,10}") {
        prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
    }

    /// Natural comparison is transitive.
    #[test]
    fn natural_cmp_transitive(
        a in "[a-c0-9]{0,6}",
        b in "[a-c0-9]{0,6}",
        c in "[a-c0-9]{0,6}",
    ) {
        let mut v = vec![a, b, c];
        v.sort_by(|x, y| natural_cmp(x, y));
        prop_assert_ne!(natural_cmp(&v[0], &v[1]), Ordering::Greater);
        prop_assert_ne!(natural_cmp(&v[1], &v[2]), Ordering::Greater);
        prop_assert_ne!(natural_cmp(&v[0], &v[2]), Ordering::Greater);
    }

    /// `log<n>` ids order by n.
    #[test]
    fn natural_cmp_numeric_suffix(a in 0u64..1_000_000, b in 0u64..1_000_000) {
        prop_assert_eq!(
            natural_cmp(&format!("log{}", a), &format!("log{}", b)),
            a.cmp(&b)
        );
    }
}

// =============================================================================
// Merge Properties
// =============================================================================

proptest! {
    /// Merging the same incoming fields twice equals merging once.
    #[test]
    fn merge_is_idempotent(base in fields(), incoming in fields()) {
        let mut once = base.clone();
        merge_fields(&mut once, incoming.clone());
        let mut twice = once.clone();
        merge_fields(&mut twice, incoming);
        prop_assert_eq!(once, twice);
    }

    /// Keys absent from the incoming fields keep their value.
    #[test]
    fn merge_preserves_untouched_keys(base in fields(), incoming in fields()) {
        let mut merged = base.clone();
        merge_fields(&mut merged, incoming.clone());
        for (key, value) in &base {
            if !incoming.contains_key(key) {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
        for key in incoming.keys() {
            prop_assert!(merged.contains_key(key));
        }
    }
}

// =============================================================================
// Value Encoding Properties
// =============================================================================

proptest! {
    /// Field maps survive the JSON encoding every backend stores.
    #[test]
    fn fields_json_roundtrip(f in fields()) {
        let raw = serde_json::to_string(&f).unwrap();
        let back: Fields = serde_json::from_str(&raw).unwrap();
        prop_assert_eq!(back, f);
    }
}

// =============================================================================
// Log Record Properties
// =============================================================================

proptest! {
    /// Decoding never panics, and every field lands in exactly one bucket.
    #[test]
    fn log_record_partitions_entries(raw in prop::collection::btree_map("log[0-9]{1,3}", value(), 0..8)) {
        let record = LogRecord::from_fields(&raw);
        prop_assert_eq!(record.len(), raw.len());
        for pair in record.entries.windows(2) {
            prop_assert_ne!(natural_cmp(&pair[0].id, &pair[1].id), Ordering::Greater);
        }
    }
}

// =============================================================================
// Tree Copy Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// copy(T); copy(T) leaves the destination exactly as copy(T) did, and the
    /// replica has the same shape as the source.
    #[test]
    fn tree_copy_is_idempotent(docs in tree_paths()) {
        runtime().block_on(async {
            let source = MemoryStore::new("source");
            let root = DocumentPath::new("root", "doc").unwrap();
            for (rel, f) in docs {
                let mut path = root.clone();
                for (collection, id) in &rel {
                    path = path.child(collection, id).unwrap();
                }
                source.set_merge(&path, f).await.unwrap();
            }
            let dest = MemoryStore::new("dest");

            copy_document_tree(&source, &dest, &root, &root).await.unwrap();
            let once = dest.snapshot().await;
            copy_document_tree(&source, &dest, &root, &root).await.unwrap();
            prop_assert_eq!(&dest.snapshot().await, &once);

            let original = DocumentNode::read(&source, &root).await.unwrap();
            let replica = DocumentNode::read(&dest, &root).await.unwrap();
            prop_assert!(original.same_content(&replica));
            Ok(())
        })?;
    }
}

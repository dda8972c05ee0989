// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Whole-collection copy.

use crate::error::{ReplicationError, Result};
use crate::path::CollectionPath;
use crate::store::DocumentStore;
use crate::tree::copy_document_tree;
use tracing::{debug, warn};

/// Result of copying one top-level collection.
#[derive(Debug)]
pub struct CollectionCopyReport {
    pub collection: String,
    /// Documents whose whole tree was copied.
    pub copied: usize,
    /// Documents whose tree copy failed, with the error.
    pub failures: Vec<(String, ReplicationError)>,
}

impl CollectionCopyReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold into a single result: any failed document makes the copy a
    /// [`ReplicationError::PartialCollection`] against `store`.
    pub fn into_result(self, store: &str) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.copied)
        } else {
            Err(ReplicationError::PartialCollection {
                store: store.to_string(),
                collection: self.collection,
                copied: self.copied,
                failed: self.failures.len(),
            })
        }
    }
}

/// Copy every document (and its tree) of the top-level `collection` from
/// `source` into `dest`.
///
/// Only enumerating the collection can fail the whole call. A failure on one
/// document is logged and recorded in the report, and enumeration continues.
pub async fn copy_collection(
    source: &dyn DocumentStore,
    dest: &dyn DocumentStore,
    collection: &str,
) -> Result<CollectionCopyReport> {
    let path = CollectionPath::root(collection)?;
    let ids = source.list_documents(&path).await?;
    debug!(collection, documents = ids.len(), dest = %dest.name(), "Copying collection");

    let mut report = CollectionCopyReport {
        collection: collection.to_string(),
        copied: 0,
        failures: Vec::new(),
    };

    for id in ids {
        let doc = path.doc(&id)?;
        match copy_document_tree(source, dest, &doc, &doc).await {
            Ok(stats) => {
                report.copied += 1;
                crate::metrics::record_documents_copied(dest.name(), stats.written);
            }
            Err(e) => {
                warn!(
                    collection,
                    doc_id = %id,
                    dest = %dest.name(),
                    error = %e,
                    "Document copy failed, continuing with collection"
                );
                report.failures.push((id, e));
            }
        }
    }

    Ok(report)
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recursive document tree copy.
//!
//! A document tree is one document plus every sub-collection beneath it, to
//! any depth:
//!
//! ```text
//! orders/A1                 {status: "paid"}
//! ├── items/
//! │   ├── i1                {qty: 2}
//! │   └── i2                {qty: 1}
//! │       └── notes/
//! │           └── n1        {text: "gift"}
//! └── audit/
//!     └── (placeholder)     no fields, owns sub-collections
//!         └── changes/
//!             └── c1        {by: "ops"}
//! ```
//!
//! [`copy_document_tree`] walks the source tree depth-first and merge-writes
//! each document to the same relative path at the destination. A document
//! with no fields is not written, but its sub-collections still are. Running
//! the copy twice against unchanged source data leaves the destination as
//! one run did.

use crate::error::Result;
use crate::path::DocumentPath;
use crate::store::DocumentStore;
use crate::value::Fields;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tracing::trace;

/// Counters for one tree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeCopyStats {
    /// Documents visited, placeholders included.
    pub visited: usize,
    /// Documents whose fields were written.
    pub written: usize,
}

impl TreeCopyStats {
    fn absorb(&mut self, other: TreeCopyStats) {
        self.visited += other.visited;
        self.written += other.written;
    }
}

/// Copy the tree rooted at `src_path` in `source` to `dst_path` in `dest`.
///
/// The first store error aborts the copy; documents already written stay
/// written, and a re-run picks up the rest.
pub async fn copy_document_tree(
    source: &dyn DocumentStore,
    dest: &dyn DocumentStore,
    src_path: &DocumentPath,
    dst_path: &DocumentPath,
) -> Result<TreeCopyStats> {
    copy_node(source, dest, src_path.clone(), dst_path.clone()).await
}

fn copy_node<'a>(
    source: &'a dyn DocumentStore,
    dest: &'a dyn DocumentStore,
    src: DocumentPath,
    dst: DocumentPath,
) -> Pin<Box<dyn Future<Output = Result<TreeCopyStats>> + Send + 'a>> {
    Box::pin(async move {
        let mut stats = TreeCopyStats {
            visited: 1,
            written: 0,
        };

        if let Some(fields) = source.get(&src).await?.filter(|f| !f.is_empty()) {
            trace!(source = %source.name(), dest = %dest.name(), path = %dst, "Copying document fields");
            dest.set_merge(&dst, fields).await?;
            stats.written = 1;
        }

        for sub in source.list_collections(&src).await? {
            let sub_collection = src.collection(&sub)?;
            for id in source.list_documents(&sub_collection).await? {
                let child_src = src.child(&sub, &id)?;
                let child_dst = dst.child(&sub, &id)?;
                stats.absorb(copy_node(source, dest, child_src, child_dst).await?);
            }
        }

        Ok(stats)
    })
}

/// A fully materialized document tree.
///
/// The copier never builds one of these; they exist to inspect and compare
/// trees (diagnostics and tests).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub path: DocumentPath,
    /// `None` for a placeholder document.
    pub fields: Option<Fields>,
    /// Sub-collection name to its documents, in id order.
    pub children: BTreeMap<String, Vec<DocumentNode>>,
}

impl DocumentNode {
    /// Read the whole tree rooted at `path` from `store`.
    pub fn read<'a>(
        store: &'a dyn DocumentStore,
        path: &'a DocumentPath,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentNode>> + Send + 'a>> {
        Box::pin(async move {
            let fields = store.get(path).await?;
            let mut children = BTreeMap::new();
            for sub in store.list_collections(path).await? {
                let mut docs = Vec::new();
                for id in store.list_documents(&path.collection(&sub)?).await? {
                    let child = path.child(&sub, &id)?;
                    docs.push(DocumentNode::read(store, &child).await?);
                }
                children.insert(sub, docs);
            }
            Ok(DocumentNode {
                path: path.clone(),
                fields,
                children,
            })
        })
    }

    /// Number of documents in the tree, placeholders included.
    pub fn len(&self) -> usize {
        1 + self
            .children
            .values()
            .flat_map(|docs| docs.iter())
            .map(DocumentNode::len)
            .sum::<usize>()
    }

    /// Maximum nesting depth below this node (0 for a leaf).
    pub fn height(&self) -> usize {
        self.children
            .values()
            .flat_map(|docs| docs.iter())
            .map(|n| 1 + n.height())
            .max()
            .unwrap_or(0)
    }

    /// Same shape and fields, ignoring the root path.
    pub fn same_content(&self, other: &DocumentNode) -> bool {
        self.fields == other.fields
            && self.children.len() == other.children.len()
            && self.children.iter().all(|(name, docs)| {
                other.children.get(name).is_some_and(|theirs| {
                    docs.len() == theirs.len()
                        && docs
                            .iter()
                            .zip(theirs)
                            .all(|(a, b)| a.path.id() == b.path.id() && a.same_content(b))
                })
            })
    }
}

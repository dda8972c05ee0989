// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document and collection paths.
//!
//! A document lives at an alternating `collection/id` sequence:
//!
//! ```text
//! orders/A1                 DocumentPath [(orders, A1)]
//! orders/A1/items           CollectionPath { parent: orders/A1, name: items }
//! orders/A1/items/i1        DocumentPath [(orders, A1), (items, i1)]
//! ```
//!
//! Backends store documents under their rendered path string. Listing the
//! documents of a collection or the sub-collections of a document is then a
//! prefix scan followed by [`child_segments`]: every stored path strictly
//! under the prefix contributes its next segment. That makes placeholder
//! documents (no fields, but owning sub-collections) show up in listings
//! without storing anything for them.

use crate::error::{ReplicationError, Result};
use std::fmt;
use std::str::FromStr;

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(ReplicationError::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains('/') {
        return Err(ReplicationError::InvalidPath(format!(
            "path segment '{}' contains '/'",
            segment
        )));
    }
    Ok(())
}

/// Path of one document: a non-empty sequence of `(collection, id)` pairs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentPath {
    segments: Vec<(String, String)>,
}

impl DocumentPath {
    /// Top-level document `collection/id`.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let (collection, id) = (collection.into(), id.into());
        validate_segment(&collection)?;
        validate_segment(&id)?;
        Ok(Self {
            segments: vec![(collection, id)],
        })
    }

    /// Extend this path by one sub-collection and document id.
    pub fn child(&self, collection: &str, id: &str) -> Result<Self> {
        validate_segment(collection)?;
        validate_segment(id)?;
        let mut segments = self.segments.clone();
        segments.push((collection.to_string(), id.to_string()));
        Ok(Self { segments })
    }

    /// The sub-collection `name` under this document.
    pub fn collection(&self, name: &str) -> Result<CollectionPath> {
        validate_segment(name)?;
        Ok(CollectionPath {
            parent: Some(self.clone()),
            name: name.to_string(),
        })
    }

    /// The document's own id.
    pub fn id(&self) -> &str {
        // segments is never empty
        self.segments.last().map(|(_, id)| id.as_str()).unwrap_or_default()
    }

    /// The collection this document belongs to.
    pub fn parent(&self) -> CollectionPath {
        let mut segments = self.segments.clone();
        let (name, _) = segments.pop().unwrap_or_default();
        CollectionPath {
            parent: if segments.is_empty() {
                None
            } else {
                Some(DocumentPath { segments })
            },
            name,
        }
    }

    /// Nesting depth (1 for a top-level document).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[(String, String)] {
        &self.segments
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (collection, id)) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}/{}", collection, id)?;
        }
        Ok(())
    }
}

impl FromStr for DocumentPath {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() < 2 || parts.len() % 2 != 0 {
            return Err(ReplicationError::InvalidPath(format!(
                "'{}' is not a document path (expected collection/id pairs)",
                s
            )));
        }
        let mut segments = Vec::with_capacity(parts.len() / 2);
        for pair in parts.chunks(2) {
            validate_segment(pair[0])?;
            validate_segment(pair[1])?;
            segments.push((pair[0].to_string(), pair[1].to_string()));
        }
        Ok(Self { segments })
    }
}

/// Path of one collection: top-level, or nested under a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    parent: Option<DocumentPath>,
    name: String,
}

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_segment(&name)?;
        Ok(Self { parent: None, name })
    }

    /// Document `id` inside this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath> {
        match &self.parent {
            Some(parent) => parent.child(&self.name, id),
            None => DocumentPath::new(self.name.clone(), id),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&DocumentPath> {
        self.parent.as_ref()
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}/{}", parent, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl FromStr for CollectionPath {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('/') {
            None => Self::root(s),
            Some((parent, name)) => parent.parse::<DocumentPath>()?.collection(name),
        }
    }
}

/// Lexicographic bounds `[prefix/, prefix0)` covering every path under `prefix`.
///
/// `'0'` is the byte after `'/'`, so the half-open range holds exactly the
/// strings that start with `prefix/`.
pub fn prefix_bounds(prefix: &str) -> (String, String) {
    (format!("{}/", prefix), format!("{}0", prefix))
}

/// Distinct next segments of every path strictly under `prefix`, sorted.
///
/// For a collection prefix these are document ids; for a document prefix
/// these are sub-collection names.
pub fn child_segments<'a, I>(prefix: &str, paths: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let lead = format!("{}/", prefix);
    let mut out: Vec<String> = paths
        .into_iter()
        .filter_map(|p| p.strip_prefix(lead.as_str()))
        .filter_map(|rest| rest.split('/').next())
        .filter(|seg| !seg.is_empty())
        .map(str::to_string)
        .collect();
    out.sort();
    out.dedup();
    out
}

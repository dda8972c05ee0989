// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The daily change log.
//!
//! One document per UTC day at `<log collection>/<YYYY-MM-DD>`. Each field
//! is one entry:
//!
//! ```text
//! logs/2024-01-01
//! {
//!   "log1":  {"collection": "orders", "doc": "A1", "type": "update", "processed": false},
//!   "log2":  {"collection": "orders", "doc": "A7", "type": "delete", "processed": true},
//!   "log10": {"collection": "users"}                      <- whole collection, create
//! }
//! ```
//!
//! `type` defaults to `create` and `processed` to `false`. `processed` is read
//! loosely (`1` or `"yes"` count as set). Entries run in natural id order
//! (`log2` before `log10`).
//!
//! An entry that has reached only some destinations carries
//! `"applied_to": {"<destination>": true, ...}` so a later run applies it to
//! the remaining ones only.

use crate::error::{ReplicationError, Result};
use crate::value::{Fields, Value};
use chrono::{NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Field names of a log entry on the wire.
pub const FIELD_COLLECTION: &str = "collection";
pub const FIELD_DOC: &str = "doc";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PROCESSED: &str = "processed";
pub const FIELD_APPLIED_TO: &str = "applied_to";

/// What a log entry asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(ReplicationError::Config(format!("unknown operation type '{}'", other))),
        }
    }
}

/// One change-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: String,
    pub collection: String,
    /// `None` means the whole collection.
    pub doc: Option<String>,
    pub op: OpType,
    pub processed: bool,
    /// Destinations this entry already reached.
    pub applied_to: BTreeSet<String>,
}

impl LogEntry {
    /// Decode one entry from its field value.
    pub fn from_value(id: &str, value: &Value) -> Result<Self> {
        let malformed = |why: String| ReplicationError::Config(format!("log entry '{}': {}", id, why));

        let map = value
            .as_map()
            .ok_or_else(|| malformed(format!("expected a map, found {}", value.type_name())))?;

        let collection = match map.get(FIELD_COLLECTION) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) => {
                return Err(malformed(format!(
                    "'collection' must be a non-empty string, found {}",
                    other.type_name()
                )))
            }
            None => return Err(malformed("missing 'collection'".to_string())),
        };

        let doc = match map.get(FIELD_DOC) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(malformed(format!("'doc' must be a string, found {}", other.type_name())))
            }
        };

        let op = match map.get(FIELD_TYPE) {
            None | Some(Value::Null) => OpType::Create,
            Some(Value::String(s)) => s.parse().map_err(|e: ReplicationError| malformed(e.to_string()))?,
            Some(other) => {
                return Err(malformed(format!("'type' must be a string, found {}", other.type_name())))
            }
        };

        let processed = map.get(FIELD_PROCESSED).map_or(false, Value::is_truthy);

        let applied_to = match map.get(FIELD_APPLIED_TO) {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Map(done)) => done
                .iter()
                .filter(|(_, flag)| flag.is_truthy())
                .map(|(name, _)| name.clone())
                .collect(),
            Some(other) => {
                return Err(malformed(format!("'applied_to' must be a map, found {}", other.type_name())))
            }
        };

        Ok(Self {
            id: id.to_string(),
            collection,
            doc,
            op,
            processed,
            applied_to,
        })
    }

    /// Whole-collection entry (no document id).
    pub fn is_collection_wide(&self) -> bool {
        self.doc.is_none()
    }
}

/// A log document decoded into entries.
#[derive(Debug, Default)]
pub struct LogRecord {
    /// Well-formed entries in natural id order.
    pub entries: Vec<LogEntry>,
    /// Entries that could not be decoded, with the reason.
    pub malformed: Vec<(String, ReplicationError)>,
}

impl LogRecord {
    pub fn from_fields(fields: &Fields) -> Self {
        let mut record = LogRecord::default();
        for (id, value) in fields {
            match LogEntry::from_value(id, value) {
                Ok(entry) => record.entries.push(entry),
                Err(e) => record.malformed.push((id.clone(), e)),
            }
        }
        record.entries.sort_by(|a, b| natural_cmp(&a.id, &b.id));
        record.malformed.sort_by(|a, b| natural_cmp(&a.0, &b.0));
        record
    }

    /// Entries still waiting to be applied, in order.
    pub fn pending(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| !e.processed)
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Natural ordering: runs of ASCII digits compare by numeric value, the rest
/// byte-wise; ties (e.g. `log02` vs `log2`) fall back to plain comparison.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < ab.len() && j < bb.len() {
        if ab[i].is_ascii_digit() && bb[j].is_ascii_digit() {
            let si = i;
            while i < ab.len() && ab[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < bb.len() && bb[j].is_ascii_digit() {
                j += 1;
            }
            let na = trim_zeros(&ab[si..i]);
            let nb = trim_zeros(&bb[sj..j]);
            let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = ab[i].cmp(&bb[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (ab.len() - i).cmp(&(bb.len() - j)).then_with(|| a.cmp(b))
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}

/// A validated `YYYY-MM-DD` log day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// Today's date in UTC.
    pub fn today_utc() -> Self {
        DateKey(Utc::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(d: NaiveDate) -> Self {
        DateKey(d)
    }
}

impl FromStr for DateKey {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 10 {
            return Err(ReplicationError::Config(format!("'{}' is not a YYYY-MM-DD date", s)));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(DateKey)
            .map_err(|e| ReplicationError::Config(format!("'{}' is not a YYYY-MM-DD date: {}", s, e)))
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Outcome types for fan-out and log runs.
//!
//! ```text
//! RunReport                         one day's log
//! └── FanoutOutcome (per entry)     one entry across every destination
//!     └── DestinationOutcome        one entry on one destination
//!         └── Result<Applied>
//! ```

use crate::error::ReplicationError;
use crate::log::DateKey;
use crate::tree::TreeCopyStats;

/// What applying one entry did to one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The document was deleted (or was already absent).
    Deleted,
    /// The document tree was copied.
    TreeCopied(TreeCopyStats),
    /// The source document does not exist; nothing to replicate.
    SourceMissing,
    /// Every document of the collection was copied.
    CollectionCopied { copied: usize },
}

impl std::fmt::Display for Applied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Applied::Deleted => write!(f, "deleted"),
            Applied::TreeCopied(stats) => {
                write!(f, "tree copied ({} visited, {} written)", stats.visited, stats.written)
            }
            Applied::SourceMissing => write!(f, "source missing"),
            Applied::CollectionCopied { copied } => write!(f, "collection copied ({} documents)", copied),
        }
    }
}

/// One entry applied to one destination.
#[derive(Debug)]
pub struct DestinationOutcome {
    pub destination: String,
    pub result: Result<Applied, ReplicationError>,
}

impl DestinationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// One entry applied across every destination, in destination name order.
#[derive(Debug)]
pub struct FanoutOutcome {
    pub entry_id: String,
    pub outcomes: Vec<DestinationOutcome>,
}

impl FanoutOutcome {
    /// True only if every destination succeeded (vacuously true with none).
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(DestinationOutcome::is_success)
    }

    /// Destinations that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ReplicationError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.destination.as_str(), e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Destinations that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.destination.as_str())
    }
}

/// Summary of one run over one day's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub date_key: DateKey,
    /// Entries in the log record, malformed ones included.
    pub entries_total: usize,
    /// Entries skipped because they were already processed.
    pub already_processed: usize,
    /// Entries fanned out in this run.
    pub applied: usize,
    /// Entries whose processed flag was set in this run.
    pub marked: usize,
    /// Fanned-out entries where at least one destination failed.
    pub partially_failed: usize,
    /// Entries kept from some destinations because an earlier entry failed
    /// there in this run.
    pub held_back: usize,
    /// Entries still unprocessed when the run ended (malformed included).
    pub left_pending: usize,
    /// Entries that could not be decoded.
    pub malformed: usize,
    /// Destinations the run fanned out to.
    pub destinations: usize,
}

impl RunReport {
    /// Report for a day with no log record.
    pub fn empty(date_key: DateKey, destinations: usize) -> Self {
        Self {
            date_key,
            entries_total: 0,
            already_processed: 0,
            applied: 0,
            marked: 0,
            partially_failed: 0,
            held_back: 0,
            left_pending: 0,
            malformed: 0,
            destinations,
        }
    }

    /// Nothing was pending for the day.
    pub fn is_noop(&self) -> bool {
        self.applied == 0 && self.malformed == 0
    }

    /// Every pending entry applied everywhere and marked.
    pub fn is_clean(&self) -> bool {
        self.partially_failed == 0 && self.held_back == 0 && self.left_pending == 0
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} entries ({} already processed), {} applied to {} destinations, {} marked, {} partially failed, {} held back, {} malformed, {} left pending",
            self.date_key,
            self.entries_total,
            self.already_processed,
            self.applied,
            self.destinations,
            self.marked,
            self.partially_failed,
            self.held_back,
            self.malformed,
            self.left_pending
        )
    }
}

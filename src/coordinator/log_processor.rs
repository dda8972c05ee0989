// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Log processor: one day's change log, entry by entry.
//!
//! # Flow
//!
//! ```text
//! read <log collection>/<YYYY-MM-DD>
//!   │ absent ──────────────────────────────→ no-op report
//!   ↓
//! decode entries (natural id order)
//!   │ malformed ───────────────────────────→ logged, counted, left unmarked
//!   ↓
//! for each entry:
//!   processed? ──────────────────────────→ skip
//!   fan out to every destination not in applied_to
//!   mark policy allows? ── no ───────────→ record applied_to, left pending
//!   ↓ yes
//!   merge {id: {processed: true}} into the log record
//! ```
//!
//! Entries are never processed concurrently: every destination sees the
//! day's operations in log order.
//!
//! Under [`MarkPolicy::OnSuccess`] a destination that fails an entry is held
//! back for the rest of the run. Later entries still reach the other
//! destinations and record them in `applied_to`; the held destination picks
//! up from its first failed entry on the next run. An old delete therefore
//! never lands after a newer create on the same destination.

use super::fanout;
use super::types::{FanoutOutcome, RunReport};
use crate::config::{FanoutConfig, LogConfig, MarkPolicy};
use crate::error::Result;
use crate::log::{DateKey, LogEntry, LogRecord, FIELD_APPLIED_TO, FIELD_PROCESSED};
use crate::metrics;
use crate::path::DocumentPath;
use crate::registry::{Destination, DestinationRegistry};
use crate::store::DocumentStore;
use crate::value::{nested_update, Fields, Value};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Path of the log record for `date` under `config`.
pub fn log_path(config: &LogConfig, date: DateKey) -> Result<DocumentPath> {
    DocumentPath::new(config.collection.as_str(), date.to_string())
}

/// Process every pending entry of the log record for `date`.
///
/// Only reading the log record can fail the run. Per-entry and
/// per-destination failures are logged and reflected in the report.
pub async fn run(
    source: &dyn DocumentStore,
    registry: &DestinationRegistry,
    log: &LogConfig,
    fanout: &FanoutConfig,
    date: DateKey,
) -> Result<RunReport> {
    let span = info_span!("log_run", date = %date, destinations = registry.len());
    process(source, registry, log, fanout, date).instrument(span).await
}

async fn process(
    source: &dyn DocumentStore,
    registry: &DestinationRegistry,
    log: &LogConfig,
    fanout: &FanoutConfig,
    date: DateKey,
) -> Result<RunReport> {
    let start = Instant::now();
    let path = log_path(log, date)?;

    let Some(fields) = source.get(&path).await? else {
        info!(path = %path, "No log record for this day, nothing to do");
        metrics::record_run(0, 0, start.elapsed());
        return Ok(RunReport::empty(date, registry.len()));
    };

    let record = LogRecord::from_fields(&fields);
    let mut report = RunReport {
        entries_total: record.len(),
        malformed: record.malformed.len(),
        ..RunReport::empty(date, registry.len())
    };
    info!(
        path = %path,
        entries = report.entries_total,
        malformed = report.malformed,
        mark_policy = %log.mark_policy,
        "Processing log record"
    );

    for (id, e) in &record.malformed {
        warn!(entry_id = %id, error = %e, "Malformed log entry left unprocessed");
        metrics::record_entry_outcome("malformed");
    }

    // Destinations that failed an entry in this run (on-success only).
    let mut held = BTreeSet::new();

    for entry in &record.entries {
        if entry.processed {
            debug!(entry_id = %entry.id, "Entry already processed, skipping");
            report.already_processed += 1;
            metrics::record_entry_outcome("skipped");
            continue;
        }

        let span = info_span!(
            "entry",
            entry_id = %entry.id,
            collection = %entry.collection,
            doc = entry.doc.as_deref().unwrap_or("*"),
            op = %entry.op
        );
        let marked = apply_and_mark(source, registry, log, fanout, &path, entry, &mut held, &mut report)
            .instrument(span)
            .await;
        if marked {
            report.marked += 1;
        }
    }

    let pending = report.entries_total - report.malformed - report.already_processed;
    report.left_pending = pending - report.marked + report.malformed;

    metrics::record_run(report.entries_total, report.left_pending, start.elapsed());
    info!(
        applied = report.applied,
        marked = report.marked,
        partially_failed = report.partially_failed,
        held_back = report.held_back,
        left_pending = report.left_pending,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Log run complete"
    );
    Ok(report)
}

/// Fan one entry out and mark it if the policy allows. Returns whether the
/// entry was marked processed.
#[allow(clippy::too_many_arguments)]
async fn apply_and_mark(
    source: &dyn DocumentStore,
    registry: &DestinationRegistry,
    log: &LogConfig,
    fanout: &FanoutConfig,
    path: &DocumentPath,
    entry: &LogEntry,
    held: &mut BTreeSet<String>,
    report: &mut RunReport,
) -> bool {
    let on_success = log.mark_policy == MarkPolicy::OnSuccess;

    let mut targets: Vec<&Destination> = Vec::new();
    let mut waiting: Vec<&str> = Vec::new();
    for destination in registry.iter() {
        if entry.applied_to.contains(&destination.name) {
            continue;
        }
        if on_success && held.contains(&destination.name) {
            waiting.push(&destination.name);
        } else {
            targets.push(destination);
        }
    }
    if !entry.applied_to.is_empty() {
        debug!(applied_to = ?entry.applied_to, "Skipping destinations the entry already reached");
    }

    // Held back from every remaining destination: nothing runs this time.
    let fully_held = targets.is_empty() && !waiting.is_empty();
    let outcome = if targets.is_empty() {
        FanoutOutcome {
            entry_id: entry.id.clone(),
            outcomes: Vec::new(),
        }
    } else {
        fanout::apply_to_each(entry, source, &targets, fanout).await
    };
    if !fully_held {
        report.applied += 1;
    }

    if outcome.is_success() {
        if !fully_held {
            metrics::record_entry_outcome("applied");
        }
    } else {
        report.partially_failed += 1;
        metrics::record_entry_outcome("partial");
        let failed: Vec<&str> = outcome.failures().map(|(destination, _)| destination).collect();
        warn!(
            failed = ?failed,
            succeeded = outcome.outcomes.len() - outcome.failed_count(),
            "Entry failed on some destinations"
        );
        if on_success {
            held.extend(failed.iter().map(|d| d.to_string()));
        }
    }

    if !waiting.is_empty() {
        report.held_back += 1;
        metrics::record_entry_outcome("held");
        info!(held = ?waiting, "Destinations held back behind an earlier failed entry");
    }

    let should_mark = match log.mark_policy {
        MarkPolicy::Always => true,
        MarkPolicy::OnSuccess => outcome.is_success() && waiting.is_empty(),
    };
    if !should_mark {
        let reached: Vec<&str> = outcome.succeeded().collect();
        if !reached.is_empty() {
            if let Err(e) = record_applied_to(source, path, &entry.id, &reached).await {
                error!(error = %e, "Failed to record reached destinations, they will be re-applied next run");
            }
        }
        info!("Entry left pending for the next run");
        return false;
    }

    match mark_processed(source, path, &entry.id).await {
        Ok(()) => {
            metrics::record_entry_marked(true);
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to mark entry processed, it will be re-applied next run");
            metrics::record_entry_marked(false);
            false
        }
    }
}

/// Add `destinations` to one entry's `applied_to` map with a single merge write.
pub async fn record_applied_to(
    source: &dyn DocumentStore,
    path: &DocumentPath,
    entry_id: &str,
    destinations: &[&str],
) -> Result<()> {
    let reached: Fields = destinations
        .iter()
        .map(|d| (d.to_string(), Value::Bool(true)))
        .collect();
    source
        .set_merge(path, nested_update(entry_id, FIELD_APPLIED_TO, Value::Map(reached)))
        .await
}

/// Set `processed` on one entry with a single merge write.
pub async fn mark_processed(source: &dyn DocumentStore, path: &DocumentPath, entry_id: &str) -> Result<()> {
    source
        .set_merge(path, nested_update(entry_id, FIELD_PROCESSED, Value::Bool(true)))
        .await
}

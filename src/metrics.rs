// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Emitted through the `metrics` facade; the binary (or an embedding
//! process) decides where they go by installing a recorder. Without one,
//! every call is a no-op.
//!
//! - Destination resolution
//! - Log entry outcomes and processed marks
//! - Per-destination apply results and documents copied
//! - Store call latency, retries, timeouts and circuit rejections
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `replicator_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! # Usage
//!
//! ```rust,no_run
//! use fanout_replicator::metrics;
//! use std::time::Duration;
//!
//! metrics::record_destination_apply("eu-west", "update", "applied", Duration::from_millis(12));
//! metrics::record_entry_outcome("applied");
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Registry
// =============================================================================

/// Record the outcome of resolving one registry entry.
pub fn record_destination_resolved(destination: &str, success: bool) {
    let status = if success { "connected" } else { "rejected" };
    counter!("replicator_destinations_resolved_total", "destination" => destination.to_string(), "status" => status)
        .increment(1);
}

/// Number of live destinations for this run.
pub fn set_destinations(count: usize) {
    gauge!("replicator_destinations").set(count as f64);
}

// =============================================================================
// Log processing
// =============================================================================

/// Record what happened to one log entry.
///
/// `outcome` is one of `applied`, `partial`, `held`, `malformed`, `skipped`.
pub fn record_entry_outcome(outcome: &str) {
    counter!("replicator_entries_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record an attempt to mark an entry processed.
pub fn record_entry_marked(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replicator_entries_marked_total", "status" => status).increment(1);
}

/// Record a completed run over one day's log.
pub fn record_run(entries_total: usize, pending: usize, duration: Duration) {
    counter!("replicator_runs_total").increment(1);
    gauge!("replicator_last_run_entries").set(entries_total as f64);
    gauge!("replicator_last_run_pending").set(pending as f64);
    histogram!("replicator_run_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Fan-out
// =============================================================================

/// Record one entry applied to one destination.
///
/// `outcome` is `applied` or `failed`.
pub fn record_destination_apply(destination: &str, op: &str, outcome: &str, duration: Duration) {
    counter!(
        "replicator_destination_applies_total",
        "destination" => destination.to_string(),
        "op" => op.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("replicator_destination_apply_duration_seconds", "destination" => destination.to_string())
        .record(duration.as_secs_f64());
}

/// Record documents written into a destination by a tree or collection copy.
pub fn record_documents_copied(destination: &str, count: usize) {
    counter!("replicator_documents_copied_total", "destination" => destination.to_string())
        .increment(count as u64);
}

// =============================================================================
// Store calls
// =============================================================================

/// Record one guarded store call attempt.
pub fn record_store_call(store: &str, operation: &str, duration: Duration, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "replicator_store_calls_total",
        "store" => store.to_string(),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "replicator_store_call_duration_seconds",
        "store" => store.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a retry of a store call after a retryable failure.
pub fn record_store_retry(store: &str, operation: &str) {
    counter!("replicator_store_retries_total", "store" => store.to_string(), "operation" => operation.to_string())
        .increment(1);
}

/// Record a store connection attempt outcome.
pub fn record_store_connect(store: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("replicator_store_connections_total", "store" => store.to_string(), "status" => status).increment(1);
}

/// Record a call rejected by an open circuit breaker.
pub fn record_circuit_rejection(store: &str) {
    counter!("replicator_circuit_rejections_total", "store" => store.to_string()).increment(1);
}

/// Record a SQLite retry (for SQLITE_BUSY/SQLITE_LOCKED).
pub fn record_sqlite_busy_retry(operation: &str) {
    counter!("replicator_sqlite_busy_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record a lost compare-and-set race on a Redis merge.
pub fn record_redis_cas_conflict(store: &str) {
    counter!("replicator_redis_cas_conflicts_total", "store" => store.to_string()).increment(1);
}

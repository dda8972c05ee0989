// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Fan-out Replicator
//!
//! Propagates document changes from one authoritative document store to a
//! dynamically configured set of destination stores, driven by a daily
//! append-only change log.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                           fanout-replicator                               │
//! │                                                                           │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────────────┐  │
//! │  │ LogProcessor │───►│ Fan-out      │───►│ per destination:            │  │
//! │  │ (one day)    │    │ (per entry)  │    │  delete | tree | collection │  │
//! │  └──────────────┘    └──────────────┘    └─────────────────────────────┘  │
//! │         │                   │                          │                  │
//! │         ▼                   ▼                          ▼                  │
//! │  ┌──────────────┐    ┌──────────────────┐    ┌──────────────────────┐     │
//! │  │ Source store │    │ Destination      │    │ GuardedStore         │     │
//! │  │ (log, data)  │    │ registry         │    │ (deadline, retry,    │     │
//! │  └──────────────┘    └──────────────────┘    │  circuit breaker)    │     │
//! │                                              └──────────────────────┘     │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! At-least-once. Document copies are merge writes and converge when re-run,
//! and entries already marked `processed` are skipped, so a repeated run over
//! the same day is safe.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fanout_replicator::{DateKey, Replicator, ReplicatorConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let replicator = Replicator::new(ReplicatorConfig::default());
//!     let report = replicator
//!         .run_from_credentials("sqlite:///var/lib/replicator/source.db", DateKey::today_utc())
//!         .await
//!         .expect("run failed");
//!     println!("{}", report);
//! }
//! ```

pub mod circuit_breaker;
pub mod collection;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod log;
pub mod metrics;
pub mod path;
pub mod registry;
pub mod resilience;
pub mod store;
pub mod tree;
pub mod value;

// Re-exports for convenience
pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use config::{CallConfig, FanoutConfig, LogConfig, MarkPolicy, RegistryConfig, ReplicatorConfig, SourceConfig};
pub use coordinator::{Applied, DestinationOutcome, FanoutOutcome, Replicator, RunReport};
pub use error::{ErrorKind, ReplicationError, Result};
pub use log::{DateKey, LogEntry, LogRecord, OpType};
pub use path::{CollectionPath, DocumentPath};
pub use registry::{Destination, DestinationRegistry};
pub use store::spec::{CredentialLoader, StoreConnector};
pub use store::{DocumentStore, GuardedStore, MemoryStore, SqliteStore, StoreSpec};
pub use tree::{copy_document_tree, DocumentNode, TreeCopyStats};
pub use value::{Fields, Value};

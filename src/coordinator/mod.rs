// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication coordinator.
//!
//! The orchestrator that ties together:
//! - Source connection via a [`CredentialLoader`]
//! - Destination discovery via [`DestinationRegistry`]
//! - The [`log_processor`] for one day's log
//! - Per-entry [`fanout`] across destinations
//!
//! # Architecture
//!
//! One invocation is one run:
//! 1. Connect the source store from its credential blob (fatal on failure)
//! 2. Resolve the destination registry (absent registry = zero destinations)
//! 3. Process the log record for the date key, entry by entry
//! 4. Return a [`RunReport`]

pub mod fanout;
pub mod log_processor;
mod types;

pub use types::{Applied, DestinationOutcome, FanoutOutcome, RunReport};

use crate::config::ReplicatorConfig;
use crate::error::{ErrorKind, ReplicationError, Result};
use crate::log::DateKey;
use crate::metrics;
use crate::registry::DestinationRegistry;
use crate::store::spec::{CredentialLoader, StoreConnector};
use crate::store::{DocumentStore, GuardedStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Name the source store is connected under.
pub const SOURCE_NAME: &str = "source";

/// Runs the replicator for one date key.
pub struct Replicator {
    config: ReplicatorConfig,
    loader: Arc<dyn CredentialLoader>,
}

impl Replicator {
    /// Create a replicator that connects stores with the default [`StoreConnector`].
    pub fn new(config: ReplicatorConfig) -> Self {
        Self::with_loader(config, Arc::new(StoreConnector::default()))
    }

    /// Create a replicator with a custom credential loader.
    pub fn with_loader(config: ReplicatorConfig, loader: Arc<dyn CredentialLoader>) -> Self {
        Self { config, loader }
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Read the source credential blob from `path`.
    ///
    /// A missing or empty file is a credential error for the source.
    pub fn read_source_credentials(path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let blob = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::credential(
                SOURCE_NAME,
                format!("cannot read credentials file {}: {}", path.display(), e),
            )
        })?;
        let blob = blob.trim();
        if blob.is_empty() {
            return Err(ReplicationError::credential(
                SOURCE_NAME,
                format!("credentials file {} is empty", path.display()),
            ));
        }
        Ok(blob.to_string())
    }

    /// Connect the source store from its credential blob.
    pub async fn connect_source(&self, blob: &str) -> Result<Arc<dyn DocumentStore>> {
        let store = self.loader.load(SOURCE_NAME, blob).await?;
        info!(source = %store.name(), "Source store connected");
        Ok(GuardedStore::wrap(store, &self.config.calls))
    }

    /// Resolve the destination registry from `source`.
    ///
    /// An absent (or misconfigured) registry document degrades to zero
    /// destinations. Failing to read it is fatal.
    pub async fn resolve_destinations(&self, source: &dyn DocumentStore) -> Result<DestinationRegistry> {
        let resolved = DestinationRegistry::resolve(
            source,
            &self.config.registry,
            self.loader.as_ref(),
            &self.config.calls,
        )
        .await;

        let registry = match resolved {
            Ok(registry) => registry,
            Err(e) if e.kind() == ErrorKind::Configuration => {
                warn!(error = %e, "No destination registry, running with zero destinations");
                DestinationRegistry::empty()
            }
            Err(e) => return Err(e),
        };
        metrics::set_destinations(registry.len());
        Ok(registry)
    }

    /// Process the log for `date` against already-resolved destinations.
    pub async fn run_with(
        &self,
        source: &dyn DocumentStore,
        registry: &DestinationRegistry,
        date: DateKey,
    ) -> Result<RunReport> {
        log_processor::run(source, registry, &self.config.log, &self.config.fanout, date).await
    }

    /// Resolve destinations from `source` and process the log for `date`.
    pub async fn run(&self, source: &dyn DocumentStore, date: DateKey) -> Result<RunReport> {
        let registry = self.resolve_destinations(source).await?;
        self.run_with(source, &registry, date).await
    }

    /// Connect the source from `blob`, then [`run`](Self::run).
    pub async fn run_from_credentials(&self, blob: &str, date: DateKey) -> Result<RunReport> {
        let source = self.connect_source(blob).await?;
        self.run(source.as_ref(), date).await
    }
}

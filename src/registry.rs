// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Destination registry.
//!
//! Destinations are discovered at runtime from one document in the source
//! store whose fields map a destination name to its credential blob:
//!
//! ```text
//! config/destinations
//! {
//!   "eu-west":  "sqlite:///data/eu-west.db",
//!   "us-east":  "{\"backend\":\"redis\",\"url\":\"redis://us-east:6379\"}",
//!   "scratch":  "memory://"
//! }
//! ```
//!
//! Older deployments keep the same document at `config/Firebase`; it is read
//! when the configured document is absent (see
//! [`RegistryConfig::fallback_document`]).
//!
//! Every entry is attempted independently. One undecodable or unreachable
//! entry is recorded in [`DestinationRegistry::rejected`] and the rest still
//! connect. Connected stores are wrapped in a [`GuardedStore`].

use crate::config::{CallConfig, RegistryConfig};
use crate::error::{ReplicationError, Result};
use crate::path::DocumentPath;
use crate::store::spec::CredentialLoader;
use crate::store::{DocumentStore, GuardedStore};
use crate::value::{Fields, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One connected destination store.
#[derive(Clone)]
pub struct Destination {
    pub name: String,
    pub store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination").field("name", &self.name).finish()
    }
}

/// Connected destinations, keyed and ordered by name.
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    destinations: BTreeMap<String, Destination>,
    rejected: Vec<(String, ReplicationError)>,
}

impl DestinationRegistry {
    /// A registry with no destinations (every run is a no-op fan-out).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from already-connected stores, as given.
    pub fn from_stores<I>(stores: I) -> Self
    where
        I: IntoIterator<Item = (String, Arc<dyn DocumentStore>)>,
    {
        let destinations = stores
            .into_iter()
            .map(|(name, store)| (name.clone(), Destination { name, store }))
            .collect();
        Self {
            destinations,
            rejected: Vec::new(),
        }
    }

    /// Read the registry document from `source` and connect every entry.
    ///
    /// Fails with a configuration error if the registry document does not
    /// exist, and with the underlying error if it cannot be read. Per-entry
    /// failures never fail the call.
    pub async fn resolve(
        source: &dyn DocumentStore,
        registry: &RegistryConfig,
        loader: &dyn CredentialLoader,
        calls: &CallConfig,
    ) -> Result<Self> {
        let path = DocumentPath::new(registry.collection.as_str(), registry.document.as_str())?;
        let entries = match source.get(&path).await? {
            Some(entries) => entries,
            None => Self::read_fallback(source, registry, &path).await?,
        };

        let mut resolved = Self::empty();
        for (name, value) in entries {
            let outcome = match &value {
                Value::String(blob) => loader.load(&name, blob).await,
                other => Err(ReplicationError::credential(
                    &name,
                    format!("credential must be a string, found {}", other.type_name()),
                )),
            };

            match outcome {
                Ok(store) => {
                    info!(destination = %name, "Destination connected");
                    crate::metrics::record_destination_resolved(&name, true);
                    let store = GuardedStore::wrap(store, calls);
                    resolved
                        .destinations
                        .insert(name.clone(), Destination { name, store });
                }
                Err(e) => {
                    warn!(destination = %name, error = %e, kind = %e.kind(), "Destination rejected");
                    crate::metrics::record_destination_resolved(&name, false);
                    resolved.rejected.push((name, e));
                }
            }
        }

        info!(
            connected = resolved.len(),
            rejected = resolved.rejected.len(),
            "Destination registry resolved"
        );
        Ok(resolved)
    }

    async fn read_fallback(
        source: &dyn DocumentStore,
        registry: &RegistryConfig,
        primary: &DocumentPath,
    ) -> Result<Fields> {
        let missing = || ReplicationError::Config(format!("registry document {} does not exist", primary));
        let Some(fallback) = registry.fallback_document.as_deref() else {
            return Err(missing());
        };
        let path = DocumentPath::new(registry.collection.as_str(), fallback)?;
        match source.get(&path).await? {
            Some(entries) => {
                info!(primary = %primary, fallback = %path, "Using fallback registry document");
                Ok(entries)
            }
            None => Err(missing()),
        }
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.get(name)
    }

    /// Destinations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.destinations.keys().cloned().collect()
    }

    /// Entries that could not be decoded or connected.
    pub fn rejected(&self) -> &[(String, ReplicationError)] {
        &self.rejected
    }
}

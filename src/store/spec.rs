// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Credential blobs: decoding and connecting.
//!
//! A credential blob is an opaque string naming one store. Two forms are
//! accepted:
//!
//! ```text
//! JSON, tagged by backend                      URL shorthand
//! {"backend":"memory"}                         memory://
//! {"backend":"sqlite","path":"/data/eu.db"}    sqlite:///data/eu.db
//! {"backend":"redis","url":"redis://h:6379",   redis://h:6379
//!  "prefix":"docs:"}                           rediss://user:pw@h:6380
//! ```
//!
//! [`CredentialLoader`] is the seam between the registry and concrete
//! stores; [`StoreConnector`] is the default loader.

use super::redis::RedisStore;
use super::sqlite::SqliteStore;
use super::{BoxFuture, DocumentStore, MemoryStore};
use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A decoded credential blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreSpec {
    /// Fresh, empty, process-local store.
    Memory,
    /// SQLite database file (`:memory:` for a private in-memory database).
    Sqlite { path: String },
    /// Redis database; every key is prefixed with `prefix`.
    Redis {
        url: String,
        #[serde(default)]
        prefix: String,
    },
}

impl StoreSpec {
    /// Open a connection to the described store.
    pub async fn connect(&self, name: &str, retry: &RetryConfig) -> Result<Arc<dyn DocumentStore>> {
        debug!(store = %name, spec = %self, "Connecting store");
        Ok(match self {
            StoreSpec::Memory => Arc::new(MemoryStore::new(name)),
            StoreSpec::Sqlite { path } => Arc::new(SqliteStore::open(name, path).await?),
            StoreSpec::Redis { url, prefix } => {
                Arc::new(RedisStore::connect(name, url, prefix.clone(), retry).await?)
            }
        })
    }
}

impl FromStr for StoreSpec {
    type Err = ReplicationError;

    fn from_str(blob: &str) -> Result<Self> {
        let blob = blob.trim();
        if blob.starts_with('{') {
            return serde_json::from_str(blob)
                .map_err(|e| ReplicationError::Config(format!("invalid credential JSON: {}", e)));
        }
        if blob == "memory://" || blob == "memory:" {
            return Ok(StoreSpec::Memory);
        }
        if let Some(path) = blob.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(ReplicationError::Config("sqlite credential has no path".into()));
            }
            return Ok(StoreSpec::Sqlite { path: path.to_string() });
        }
        if blob.starts_with("redis://") || blob.starts_with("rediss://") {
            return Ok(StoreSpec::Redis {
                url: blob.to_string(),
                prefix: String::new(),
            });
        }
        Err(ReplicationError::Config(
            "unrecognised credential (expected JSON or memory://, sqlite://, redis:// URL)".into(),
        ))
    }
}

impl fmt::Display for StoreSpec {
    /// Renders without secrets (Redis userinfo is dropped).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreSpec::Memory => write!(f, "memory"),
            StoreSpec::Sqlite { path } => write!(f, "sqlite:{}", path),
            StoreSpec::Redis { url, prefix } => {
                let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
                let host = rest.rsplit_once('@').map(|(_, h)| h).unwrap_or(rest);
                write!(f, "redis:{}", host)?;
                if !prefix.is_empty() {
                    write!(f, " prefix={}", prefix)?;
                }
                Ok(())
            }
        }
    }
}

/// Turns one destination's credential blob into a live store.
///
/// Errors are scoped to that destination and surface as
/// [`ReplicationError::Credential`].
pub trait CredentialLoader: Send + Sync {
    fn load<'a>(&'a self, name: &'a str, blob: &'a str) -> BoxFuture<'a, Arc<dyn DocumentStore>>;
}

/// Default loader: parse the blob as a [`StoreSpec`] and connect.
#[derive(Debug, Clone)]
pub struct StoreConnector {
    retry: RetryConfig,
}

impl Default for StoreConnector {
    fn default() -> Self {
        Self::new(RetryConfig::startup())
    }
}

impl StoreConnector {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }
}

impl CredentialLoader for StoreConnector {
    fn load<'a>(&'a self, name: &'a str, blob: &'a str) -> BoxFuture<'a, Arc<dyn DocumentStore>> {
        Box::pin(async move {
            let spec: StoreSpec = blob
                .parse()
                .map_err(|e: ReplicationError| ReplicationError::credential(name, e.to_string()))?;
            spec.connect(name, &self.retry).await.map_err(|e| match e {
                e @ ReplicationError::Credential { .. } => e,
                other => ReplicationError::credential(name, format!("cannot connect to {}: {}", spec, other)),
            })
        })
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the fan-out replicator.
//!
//! Every failure in the crate is a [`ReplicationError`]. Variants carry the
//! store, operation and path they happened against so a log line is enough to
//! locate the problem.
//!
//! # Error Kinds
//!
//! Variants fold into three operator-facing kinds via [`ReplicationError::kind()`]:
//!
//! | Kind | Variants | Scope |
//! |------|----------|-------|
//! | `Configuration` | `Config`, `InvalidPath` | registry doc / log record missing or malformed |
//! | `Credential` | `Credential` | one destination's credential blob |
//! | `Replication` | everything else | one store, one document or collection |
//!
//! # Retry Behavior
//!
//! | Variant | Retryable | Why it fails |
//! |---------|-----------|--------------|
//! | `Timeout` | Yes | Store call exceeded its deadline |
//! | `Store` (transient) | Yes | Connection dropped, IO error |
//! | `Redis` | Depends | Redis reports connection/IO errors as retryable |
//! | `Sqlite` | No | Busy/locked is retried inside the store already |
//! | `CircuitOpen` | No | Store has failed too often, fail fast |
//! | `Credential`, `Config` | No | Needs an operator |
//! | `Serialization` | No | Stored document is not valid JSON |
//!
//! The guarded store uses [`ReplicationError::is_retryable()`] to decide
//! whether to back off and try again.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Operator-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Registry document or log record missing/malformed. Degrades to a no-op.
    Configuration,
    /// One destination's credentials could not be decoded or connected.
    Credential,
    /// A read/write against a specific store failed.
    Replication,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Credential => write!(f, "credential"),
            ErrorKind::Replication => write!(f, "replication"),
        }
    }
}

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Invalid or missing configuration.
    ///
    /// Also used for an absent registry document and malformed log entries.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A destination's credential blob could not be decoded or connected.
    ///
    /// Scoped to that one destination; the others still proceed.
    #[error("Credential error ({destination}): {message}")]
    Credential { destination: String, message: String },

    /// A document or collection path segment was empty or contained `/`.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A store operation failed.
    #[error("Store error ({store} {operation} {path}): {message}")]
    Store {
        store: String,
        operation: String,
        path: String,
        message: String,
        /// Transient failures (connection loss, IO) are worth retrying.
        transient: bool,
    },

    /// A store call exceeded its deadline.
    #[error("Timeout ({store} {operation}) after {timeout_ms}ms")]
    Timeout {
        store: String,
        operation: String,
        timeout_ms: u64,
    },

    /// The circuit breaker for a store is open; the call was not attempted.
    #[error("Circuit open for store {store}")]
    CircuitOpen { store: String },

    /// A whole-collection copy finished with per-document failures.
    #[error("Collection copy into {store} of '{collection}' incomplete: {copied} copied, {failed} failed")]
    PartialCollection {
        store: String,
        collection: String,
        copied: usize,
        failed: usize,
    },

    /// SQLite error from the SQLite document store.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Redis connection or command error.
    #[error("Redis error ({operation}): {message}")]
    Redis {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// Stored document or credential blob is not valid JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error (credential files, config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a Redis error from a redis::RedisError
    pub fn redis(operation: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Redis {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a Redis error without source
    pub fn redis_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Redis {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a store error.
    pub fn store(
        store: impl Into<String>,
        operation: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Store {
            store: store.into(),
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a transient (retryable) store error.
    pub fn transient(
        store: impl Into<String>,
        operation: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Store {
            store: store.into(),
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Create a credential error for one destination.
    pub fn credential(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Credential {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::InvalidPath(_) => ErrorKind::Configuration,
            Self::Credential { .. } => ErrorKind::Credential,
            _ => ErrorKind::Replication,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Store { transient, .. } => *transient,
            Self::Redis { source, .. } => source.as_ref().is_some_and(|e| {
                e.is_connection_dropped() || e.is_io_error() || e.is_timeout() || e.is_connection_refusal()
            }),
            Self::Io(_) => true,
            Self::Sqlite(_) => false, // busy/locked already retried in the store
            Self::CircuitOpen { .. } => false,
            Self::PartialCollection { .. } => false,
            Self::Config(_) => false,
            Self::Credential { .. } => false,
            Self::InvalidPath(_) => false,
            Self::Serialization(_) => false,
            Self::Internal(_) => false,
        }
    }
}

impl From<redis::RedisError> for ReplicationError {
    fn from(e: redis::RedisError) -> Self {
        Self::redis("unknown", e)
    }
}

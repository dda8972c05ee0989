// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the fan-out replicator.
//!
//! Every field has a default, so an empty JSON object (or no config file at
//! all) is a valid configuration. CLI flags override individual fields.
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicatorConfig
//! ├── source: SourceConfig          # where the source credentials come from
//! ├── registry: RegistryConfig      # location of the destinations document
//! ├── log: LogConfig                # log collection + processed-marking policy
//! ├── fanout: FanoutConfig          # sequential or parallel destinations
//! └── calls: CallConfig             # per-call deadline, retry, circuit breaker
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "source": { "credentials_file": "/etc/replicator/source.json" },
//!   "registry": { "collection": "config", "document": "destinations", "fallback_document": "Firebase" },
//!   "log": { "collection": "logs", "mark_policy": "on-success" },
//!   "fanout": { "parallel": true, "max_concurrency": 4 },
//!   "calls": { "timeout": "10s", "max_attempts": 4, "writes_per_sec": 500 }
//! }
//! ```

use crate::circuit_breaker::CircuitConfig;
use crate::error::{ReplicationError, Result};
use crate::resilience::{RateLimitConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to [`crate::coordinator::Replicator`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub calls: CallConfig,
}

impl ReplicatorConfig {
    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ReplicationError::Config(format!("invalid config file {}: {}", path.display(), e))
        })
    }

    /// Create a config with fast timeouts and retries for tests.
    pub fn for_testing() -> Self {
        Self {
            calls: CallConfig::for_testing(),
            ..Default::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SourceConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the source store's credential blob is read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// File holding the source credential blob (JSON or URL shorthand).
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

fn default_credentials_file() -> String {
    "source-store.json".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RegistryConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Location of the registry document in the source store.
///
/// The document's fields are `{destinationName: credentialBlob}`.
///
/// When `document` does not exist, `fallback_document` (in the same
/// collection) is read instead. It defaults to `Firebase`, the name older
/// deployments keep their registry under. Set it to `null` to disable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_collection")]
    pub collection: String,
    #[serde(default = "default_registry_document")]
    pub document: String,
    #[serde(default = "default_registry_fallback")]
    pub fallback_document: Option<String>,
}

fn default_registry_collection() -> String {
    "config".to_string()
}

fn default_registry_document() -> String {
    "destinations".to_string()
}

fn default_registry_fallback() -> Option<String> {
    Some("Firebase".to_string())
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            collection: default_registry_collection(),
            document: default_registry_document(),
            fallback_document: default_registry_fallback(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LogConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// When an entry is marked processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MarkPolicy {
    /// Mark after every fan-out attempt. A destination that failed misses the
    /// entry for good, but every destination sees entries in log order.
    #[default]
    Always,
    /// Mark only when every destination succeeded. The entry is re-applied
    /// to all destinations on the next run.
    OnSuccess,
}

impl std::fmt::Display for MarkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkPolicy::Always => write!(f, "always"),
            MarkPolicy::OnSuccess => write!(f, "on-success"),
        }
    }
}

/// Change log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Collection holding one log document per day (`<collection>/<YYYY-MM-DD>`).
    #[serde(default = "default_log_collection")]
    pub collection: String,

    #[serde(default)]
    pub mark_policy: MarkPolicy,
}

fn default_log_collection() -> String {
    "logs".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            collection: default_log_collection(),
            mark_policy: MarkPolicy::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FanoutConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// How one entry is applied across destinations.
///
/// Entries themselves are always processed one at a time, in log order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Apply one entry to all destinations concurrently.
    #[serde(default)]
    pub parallel: bool,

    /// Cap on concurrent destinations when `parallel` is set (0 = no cap
    /// beyond the destination count).
    #[serde(default)]
    pub max_concurrency: usize,
}

impl FanoutConfig {
    /// Concurrency to use for `destinations` destinations.
    pub fn concurrency_for(&self, destinations: usize) -> usize {
        if self.max_concurrency == 0 {
            destinations.max(1)
        } else {
            self.max_concurrency.min(destinations).max(1)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CallConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Deadline, retry and circuit-breaker settings for every store call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Deadline per store call as a duration string (e.g., "30s").
    #[serde(default = "default_call_timeout")]
    pub timeout: String,

    /// Attempts per store call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// First retry delay (e.g., "200ms"), doubling per attempt.
    #[serde(default = "default_backoff_initial")]
    pub backoff_initial: String,

    /// Ceiling for the retry delay (e.g., "5s").
    #[serde(default = "default_backoff_max")]
    pub backoff_max: String,

    /// Failure window that trips a store's circuit breaker.
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,

    /// How long a tripped circuit stays open (e.g., "30s").
    #[serde(default = "default_circuit_reset_timeout")]
    pub circuit_reset_timeout: String,

    /// Optional cap on writes per second into each destination.
    #[serde(default)]
    pub writes_per_sec: Option<u32>,
}

fn default_call_timeout() -> String {
    "30s".to_string()
}

fn default_max_attempts() -> usize {
    3
}

fn default_backoff_initial() -> String {
    "200ms".to_string()
}

fn default_backoff_max() -> String {
    "5s".to_string()
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_reset_timeout() -> String {
    "30s".to_string()
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            timeout: default_call_timeout(),
            max_attempts: default_max_attempts(),
            backoff_initial: default_backoff_initial(),
            backoff_max: default_backoff_max(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout: default_circuit_reset_timeout(),
            writes_per_sec: None,
        }
    }
}

fn parse_duration_or(raw: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(raw).unwrap_or(fallback)
}

impl CallConfig {
    /// Fast deadlines and retries for tests.
    pub fn for_testing() -> Self {
        Self {
            timeout: "500ms".to_string(),
            max_attempts: 2,
            backoff_initial: "5ms".to_string(),
            backoff_max: "20ms".to_string(),
            circuit_failure_threshold: 4,
            circuit_reset_timeout: "50ms".to_string(),
            writes_per_sec: None,
        }
    }

    /// Parse timeout string to Duration (falls back to 30s).
    pub fn timeout_duration(&self) -> Duration {
        parse_duration_or(&self.timeout, Duration::from_secs(30))
    }

    /// Retry settings for store calls.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: parse_duration_or(&self.backoff_initial, Duration::from_millis(200)),
            max_delay: parse_duration_or(&self.backoff_max, Duration::from_secs(5)),
            backoff_factor: 2.0,
            connection_timeout: self.timeout_duration(),
        }
    }

    /// Circuit breaker settings for each store.
    pub fn circuit_config(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold.max(1),
            success_threshold: 1,
            recovery_timeout: parse_duration_or(&self.circuit_reset_timeout, Duration::from_secs(30)),
        }
    }

    /// Write rate limit, if configured.
    pub fn rate_limit_config(&self) -> Option<RateLimitConfig> {
        self.writes_per_sec.map(RateLimitConfig::per_second)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

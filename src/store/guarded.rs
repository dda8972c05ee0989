// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Guarded store: deadline, retry, circuit breaker and write rate limiting
//! around any [`DocumentStore`].
//!
//! ```text
//! caller ──► rate limit (writes) ──► retry loop ──► circuit breaker ──► timeout ──► inner store
//!                                       ▲                                   │
//!                                       └──── retryable error, backoff ─────┘
//! ```
//!
//! - Every call gets its own deadline; an elapsed deadline is a retryable
//!   [`ReplicationError::Timeout`].
//! - Retryable failures (see [`ReplicationError::is_retryable`]) are retried
//!   with exponential backoff up to `max_attempts`.
//! - Each attempt passes through the store's circuit breaker. While it is
//!   open, calls fail at once with [`ReplicationError::CircuitOpen`] and are
//!   not retried.

use super::{BoxFuture, DocumentStore};
use crate::circuit_breaker::{CircuitBreaker, CircuitError};
use crate::config::CallConfig;
use crate::error::{ReplicationError, Result};
use crate::path::{CollectionPath, DocumentPath};
use crate::resilience::{RateLimiter, RetryConfig};
use crate::value::Fields;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::warn;

/// A [`DocumentStore`] decorator that bounds and retries every call.
pub struct GuardedStore {
    inner: Arc<dyn DocumentStore>,
    call_timeout: Duration,
    retry: RetryConfig,
    circuit: CircuitBreaker,
    limiter: Option<RateLimiter>,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn DocumentStore>, calls: &CallConfig) -> Self {
        let circuit = CircuitBreaker::new(inner.name(), calls.circuit_config());
        Self {
            call_timeout: calls.timeout_duration(),
            retry: calls.retry_config(),
            limiter: calls.rate_limit_config().map(RateLimiter::new),
            circuit,
            inner,
        }
    }

    /// Wrap `inner` and erase the type, ready for the registry.
    pub fn wrap(inner: Arc<dyn DocumentStore>, calls: &CallConfig) -> Arc<dyn DocumentStore> {
        Arc::new(Self::new(inner, calls))
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    async fn run<'a, T, F>(&'a self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'a, T>,
    {
        let store = self.inner.name();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();
            let deadline = self.call_timeout;
            let fut = call();

            let outcome = self
                .circuit
                .call(|| async move {
                    match timeout(deadline, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(ReplicationError::Timeout {
                            store: store.to_string(),
                            operation: operation.to_string(),
                            timeout_ms: deadline.as_millis() as u64,
                        }),
                    }
                })
                .await;

            let result = match outcome {
                Ok(value) => Ok(value),
                Err(CircuitError::Rejected) => Err(ReplicationError::CircuitOpen {
                    store: store.to_string(),
                }),
                Err(CircuitError::Inner(e)) => Err(e),
            };
            crate::metrics::record_store_call(store, operation, start.elapsed(), result.is_ok());

            match result {
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        store = %store,
                        operation,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Store call failed, retrying"
                    );
                    crate::metrics::record_store_retry(store, operation);
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
    }
}

impl DocumentStore for GuardedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
        Box::pin(self.run("get", move || self.inner.get(path)))
    }

    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.throttle().await;
            self.run("set_merge", move || self.inner.set_merge(path, fields.clone()))
                .await
        })
    }

    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.throttle().await;
            self.run("delete", move || self.inner.delete(path)).await
        })
    }

    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(self.run("list_documents", move || self.inner.list_documents(collection)))
    }

    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(self.run("list_collections", move || self.inner.list_collections(document)))
    }
}

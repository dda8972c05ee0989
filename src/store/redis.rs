// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis-backed document store.
//!
//! # Key Layout
//!
//! ```text
//! {prefix}doc:orders/A1            STRING  {"status":"paid"}
//! {prefix}doc:orders/A1/items/i1   STRING  {"qty":2}
//! {prefix}paths                    ZSET    every stored path, score 0
//! ```
//!
//! All members of `{prefix}paths` share one score, so `ZRANGEBYLEX` over
//! [`crate::path::prefix_bounds`] lists everything under a collection or
//! document.
//!
//! # Merge Writes
//!
//! A merge is read, merge in process, then a compare-and-set Lua script that
//! only writes if the stored JSON is still what was read. On conflict the
//! merge is redone, up to [`MAX_CAS_ATTEMPTS`] times. Concurrent merges into
//! one document therefore never drop each other's fields.
//!
//! # Connection
//!
//! Uses `redis::aio::ConnectionManager`, which reconnects on connection loss
//! and multiplexes commands over one socket. The initial connect is retried
//! with backoff, each attempt bounded by `connection_timeout`.

use super::{BoxFuture, DocumentStore};
use crate::error::{ReplicationError, Result};
use crate::path::{child_segments, prefix_bounds, CollectionPath, DocumentPath};
use crate::resilience::RetryConfig;
use crate::value::{merge_fields, Fields};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Upper bound on compare-and-set retries for one merge.
pub const MAX_CAS_ATTEMPTS: usize = 16;

/// KEYS[1] = doc key, KEYS[2] = paths zset
/// ARGV[1] = "1" if the doc existed when read, ARGV[2] = JSON read,
/// ARGV[3] = merged JSON, ARGV[4] = path
const CAS_SET_SCRIPT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if cur ~= ARGV[2] then return 0 end
elseif cur then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3])
redis.call('ZADD', KEYS[2], 0, ARGV[4])
return 1
"#;

/// Document store in a Redis database.
pub struct RedisStore {
    name: String,
    prefix: String,
    conn: ConnectionManager,
    cas: Script,
}

impl RedisStore {
    /// Connect to `url`, retrying per `retry`.
    pub async fn connect(
        name: impl Into<String>,
        url: &str,
        prefix: impl Into<String>,
        retry: &RetryConfig,
    ) -> Result<Self> {
        let name = name.into();
        info!(store = %name, "Connecting to Redis document store");

        let client = Client::open(url)
            .map_err(|e| ReplicationError::credential(&name, format!("Invalid Redis URL: {}", e)))?;

        let mut attempt = 0;
        let mut delay = retry.initial_delay;

        loop {
            attempt += 1;

            // Bound each attempt so an unreachable host cannot hang the run
            let conn_result = timeout(retry.connection_timeout, client.get_connection_manager()).await;

            let failure = match conn_result {
                Ok(Ok(conn)) => {
                    if attempt > 1 {
                        info!(store = %name, attempt, "Connected to Redis after retry");
                    } else {
                        info!(store = %name, "Connected to Redis");
                    }
                    crate::metrics::record_store_connect(&name, true);
                    return Ok(Self {
                        name,
                        prefix: prefix.into(),
                        conn,
                        cas: Script::new(CAS_SET_SCRIPT),
                    });
                }
                Ok(Err(e)) => format!("{}", e),
                Err(_) => format!(
                    "connection timed out ({}ms timeout)",
                    retry.connection_timeout.as_millis()
                ),
            };

            if attempt >= retry.max_attempts {
                error!(store = %name, attempt, error = %failure, "Failed to connect after max retries");
                crate::metrics::record_store_connect(&name, false);
                return Err(ReplicationError::transient(
                    &name,
                    "connect",
                    "",
                    format!("Connection failed after {} attempts: {}", attempt, failure),
                ));
            }

            warn!(
                store = %name,
                attempt,
                delay_ms = delay.as_millis(),
                error = %failure,
                "Connection attempt failed, retrying"
            );

            tokio::time::sleep(delay).await;
            delay = std::cmp::min(
                Duration::from_secs_f64(delay.as_secs_f64() * retry.backoff_factor),
                retry.max_delay,
            );
        }
    }

    fn doc_key(&self, path: &str) -> String {
        format!("{}doc:{}", self.prefix, path)
    }

    fn paths_key(&self) -> String {
        format!("{}paths", self.prefix)
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| ReplicationError::redis("GET", e))
    }

    async fn children(&self, prefix: String) -> Result<Vec<String>> {
        let (lo, hi) = prefix_bounds(&prefix);
        let mut conn = self.conn.clone();
        let paths: Vec<String> = redis::cmd("ZRANGEBYLEX")
            .arg(self.paths_key())
            .arg(format!("[{}", lo))
            .arg(format!("({}", hi))
            .query_async(&mut conn)
            .await
            .map_err(|e| ReplicationError::redis("ZRANGEBYLEX", e))?;
        Ok(child_segments(&prefix, paths.iter().map(String::as_str)))
    }
}

impl DocumentStore for RedisStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
        Box::pin(async move {
            let key = self.doc_key(&path.to_string());
            match self.read_raw(&key).await? {
                Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                    ReplicationError::redis_msg("GET", format!("{} is not a document: {}", key, e))
                }),
                None => Ok(None),
            }
        })
    }

    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let path_str = path.to_string();
            let key = self.doc_key(&path_str);
            let paths_key = self.paths_key();

            for attempt in 1..=MAX_CAS_ATTEMPTS {
                let current = self.read_raw(&key).await?;
                let mut merged = match &current {
                    Some(raw) => serde_json::from_str(raw)?,
                    None => Fields::new(),
                };
                merge_fields(&mut merged, fields.clone());
                let merged_raw = serde_json::to_string(&merged)?;

                let mut conn = self.conn.clone();
                let applied: i64 = self
                    .cas
                    .key(&key)
                    .key(&paths_key)
                    .arg(if current.is_some() { "1" } else { "0" })
                    .arg(current.as_deref().unwrap_or(""))
                    .arg(&merged_raw)
                    .arg(&path_str)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|e| ReplicationError::redis("EVALSHA", e))?;

                if applied == 1 {
                    return Ok(());
                }
                debug!(store = %self.name, path = %path_str, attempt, "Merge lost a race, retrying");
                crate::metrics::record_redis_cas_conflict(&self.name);
            }

            Err(ReplicationError::transient(
                &self.name,
                "set_merge",
                path_str,
                format!("document kept changing across {} merge attempts", MAX_CAS_ATTEMPTS),
            ))
        })
    }

    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let path_str = path.to_string();
            let mut conn = self.conn.clone();
            redis::pipe()
                .atomic()
                .del(self.doc_key(&path_str))
                .ignore()
                .zrem(self.paths_key(), &path_str)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| ReplicationError::redis("DEL", e))
        })
    }

    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { self.children(collection.to_string()).await })
    }

    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { self.children(document.to_string()).await })
    }
}

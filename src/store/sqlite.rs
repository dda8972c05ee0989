// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed document store.
//!
//! One row per document, keyed by the rendered path, with the fields stored
//! as a JSON object:
//!
//! ```text
//! documents
//! ┌───────────────────────┬──────────────────────────┬────────────┐
//! │ path (PK)             │ fields (JSON)            │ updated_at │
//! ├───────────────────────┼──────────────────────────┼────────────┤
//! │ orders/A1             │ {"status":"paid"}        │ 1718...    │
//! │ orders/A1/items/i1    │ {"qty":2}                │ 1718...    │
//! └───────────────────────┴──────────────────────────┴────────────┘
//! ```
//!
//! Sub-collection listings are a range scan on the primary key (see
//! [`crate::path::prefix_bounds`]), so no separate index of collections is
//! kept.
//!
//! # SQLite Busy Handling
//!
//! A merge is a read-modify-write inside one transaction. Writers in this
//! process are serialized on a mutex; when another process holds the write
//! lock SQLite answers SQLITE_BUSY/SQLITE_LOCKED, and the whole transaction
//! is retried with exponential backoff (max 5 attempts).
//!
//! # Durability
//!
//! WAL journal with `synchronous = NORMAL`. [`SqliteStore::close`] runs a
//! truncating checkpoint so the database file is self-contained afterwards.

use super::{BoxFuture, DocumentStore};
use crate::error::{ReplicationError, Result};
use crate::path::{child_segments, prefix_bounds, CollectionPath, DocumentPath};
use crate::value::{merge_fields, Fields};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for SQLite busy retry behavior
const SQLITE_RETRY_MAX_ATTEMPTS: u32 = 5;
const SQLITE_RETRY_BASE_DELAY_MS: u64 = 10;
const SQLITE_RETRY_MAX_DELAY_MS: u64 = 500;

/// Special path for a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Check if an error is a retryable SQLite busy/locked error
fn is_sqlite_busy_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            // Primary result codes: SQLITE_BUSY = 5, SQLITE_LOCKED = 6.
            // Extended codes (e.g. BUSY_SNAPSHOT = 517) keep the primary in the low byte.
            if let Some(code) = db_err.code().and_then(|c| c.parse::<i32>().ok()) {
                return matches!(code & 0xff, 5 | 6);
            }
            let msg = db_err.message().to_lowercase();
            msg.contains("database is locked") || msg.contains("database is busy")
        }
        _ => false,
    }
}

/// Execute a database operation with retry on SQLITE_BUSY/SQLITE_LOCKED
async fn execute_with_retry<F, Fut, T>(operation_name: &str, mut f: F) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    let mut delay_ms = SQLITE_RETRY_BASE_DELAY_MS;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        operation = operation_name,
                        attempts,
                        "SQLite operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if is_sqlite_busy_error(&e) && attempts < SQLITE_RETRY_MAX_ATTEMPTS => {
                warn!(
                    operation = operation_name,
                    attempts,
                    max_attempts = SQLITE_RETRY_MAX_ATTEMPTS,
                    delay_ms,
                    "SQLite busy, retrying"
                );
                crate::metrics::record_sqlite_busy_retry(operation_name);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(SQLITE_RETRY_MAX_DELAY_MS);
            }
            Err(e) => {
                if is_sqlite_busy_error(&e) {
                    warn!(
                        operation = operation_name,
                        attempts,
                        "SQLite busy, max retries exceeded"
                    );
                }
                return Err(e);
            }
        }
    }
}

fn decode_fields(raw: &str) -> std::result::Result<Fields, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Document store backed by a single SQLite database file.
pub struct SqliteStore {
    name: String,
    pool: SqlitePool,
    /// Held across each read-modify-write
    write_lock: Mutex<()>,
    path: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// `":memory:"` opens a private in-memory database, held on a single
    /// connection for the lifetime of the store.
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let path_str = path.as_ref().to_string_lossy().to_string();
        info!(store = %name, path = %path_str, "Opening SQLite document store");

        let pool = if path_str == IN_MEMORY {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            let options = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path_str))
                .map_err(|e| ReplicationError::Config(format!("Invalid SQLite path: {}", e)))?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await?
        };

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                fields TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self {
            name,
            pool,
            write_lock: Mutex::new(()),
            path: path_str,
        })
    }

    /// Get database path (for diagnostics).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of stored documents.
    pub async fn count(&self) -> Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn children(&self, prefix: String) -> Result<Vec<String>> {
        let (lo, hi) = prefix_bounds(&prefix);
        let pool = &self.pool;
        let (lo, hi) = (lo.as_str(), hi.as_str());

        let rows: Vec<(String,)> = execute_with_retry("doc_list", || async move {
            sqlx::query_as("SELECT path FROM documents WHERE path >= ? AND path < ? ORDER BY path")
                .bind(lo)
                .bind(hi)
                .fetch_all(pool)
                .await
        })
        .await?;

        Ok(child_segments(&prefix, rows.iter().map(|(p,)| p.as_str())))
    }

    /// Force flush WAL to main database (for clean shutdown).
    pub async fn checkpoint(&self) -> Result<()> {
        if self.path == IN_MEMORY {
            return Ok(());
        }
        let pool = &self.pool;

        execute_with_retry("doc_checkpoint", || async move {
            sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(pool).await
        })
        .await?;

        debug!(store = %self.name, "WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint WAL and close the connection pool.
    pub async fn close(&self) {
        if let Err(e) = self.checkpoint().await {
            warn!(store = %self.name, error = %e, "Failed to checkpoint WAL on close");
        }
        self.pool.close().await;
        info!(store = %self.name, "SQLite document store closed");
    }
}

impl DocumentStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, Option<Fields>> {
        Box::pin(async move {
            let key = path.to_string();
            let pool = &self.pool;
            let key_ref = key.as_str();

            let row: Option<(String,)> = execute_with_retry("doc_get", || async move {
                sqlx::query_as("SELECT fields FROM documents WHERE path = ?")
                    .bind(key_ref)
                    .fetch_optional(pool)
                    .await
            })
            .await?;

            match row {
                Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
    }

    fn set_merge<'a>(&'a self, path: &'a DocumentPath, fields: Fields) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let key = path.to_string();
            let pool = &self.pool;
            let key_ref = key.as_str();
            let incoming = &fields;
            let _guard = self.write_lock.lock().await;

            execute_with_retry("doc_set_merge", || async move {
                let mut tx = pool.begin().await?;

                let existing: Option<(String,)> =
                    sqlx::query_as("SELECT fields FROM documents WHERE path = ?")
                        .bind(key_ref)
                        .fetch_optional(&mut *tx)
                        .await?;

                let mut merged = match existing {
                    Some((raw,)) => decode_fields(&raw)?,
                    None => Fields::new(),
                };
                merge_fields(&mut merged, incoming.clone());
                let raw = serde_json::to_string(&merged).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

                sqlx::query(
                    r#"
                    INSERT INTO documents (path, fields, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(path) DO UPDATE SET
                        fields = excluded.fields,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key_ref)
                .bind(raw)
                .bind(chrono::Utc::now().timestamp_millis())
                .execute(&mut *tx)
                .await?;

                tx.commit().await
            })
            .await?;

            Ok(())
        })
    }

    fn delete<'a>(&'a self, path: &'a DocumentPath) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let key = path.to_string();
            let pool = &self.pool;
            let key_ref = key.as_str();
            let _guard = self.write_lock.lock().await;

            execute_with_retry("doc_delete", || async move {
                sqlx::query("DELETE FROM documents WHERE path = ?")
                    .bind(key_ref)
                    .execute(pool)
                    .await
            })
            .await?;

            Ok(())
        })
    }

    fn list_documents<'a>(&'a self, collection: &'a CollectionPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { self.children(collection.to_string()).await })
    }

    fn list_collections<'a>(&'a self, document: &'a DocumentPath) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move { self.children(document.to_string()).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fields(v: serde_json::Value) -> Fields {
        serde_json::from_value(v).unwrap()
    }

    fn doc(s: &str) -> DocumentPath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_store_basic() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open("dest", dir.path().join("docs.db")).await.unwrap();

        assert!(store.get(&doc("orders/A1")).await.unwrap().is_none());

        store.set_merge(&doc("orders/A1"), fields(json!({"status": "new", "qty": 2}))).await.unwrap();
        store.set_merge(&doc("orders/A1"), fields(json!({"status": "paid"}))).await.unwrap();

        assert_eq!(
            store.get(&doc("orders/A1")).await.unwrap().unwrap(),
            fields(json!({"status": "paid", "qty": 2}))
        );
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.path().contains("docs.db"));

        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_persistence() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("persist.db");

        {
            let store = SqliteStore::open("dest", &db_path).await.unwrap();
            store.set_merge(&doc("orders/A1"), fields(json!({"x": 1}))).await.unwrap();
            store.close().await;
        }

        {
            let store = SqliteStore::open("dest", &db_path).await.unwrap();
            assert_eq!(
                store.get(&doc("orders/A1")).await.unwrap().unwrap(),
                fields(json!({"x": 1}))
            );
            store.close().await;
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_keeps_large_integers() {
        let store = SqliteStore::open("dest", IN_MEMORY).await.unwrap();
        let big = fields(json!({"id": u64::MAX, "neg": i64::MIN, "ratio": 0.5}));
        store.set_merge(&doc("ids/A1"), big.clone()).await.unwrap();

        let stored = store.get(&doc("ids/A1")).await.unwrap().unwrap();
        assert_eq!(stored, big);
        assert_eq!(stored["id"], crate::value::Value::Unsigned(u64::MAX));
        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_delete() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open("dest", dir.path().join("del.db")).await.unwrap();

        store.set_merge(&doc("orders/A1"), fields(json!({"x": 1}))).await.unwrap();
        store.set_merge(&doc("orders/A1/items/i1"), fields(json!({"q": 1}))).await.unwrap();
        store.delete(&doc("orders/A1")).await.unwrap();
        store.delete(&doc("orders/missing")).await.unwrap();

        assert!(store.get(&doc("orders/A1")).await.unwrap().is_none());
        assert!(store.get(&doc("orders/A1/items/i1")).await.unwrap().is_some());

        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_listings() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open("dest", dir.path().join("list.db")).await.unwrap();

        for p in ["orders/A1", "orders/A10", "orders/A1/items/i1", "orders/B2/notes/n1", "orders0/Z", "order/Y"] {
            store.set_merge(&doc(p), fields(json!({"x": 1}))).await.unwrap();
        }

        let orders = CollectionPath::root("orders").unwrap();
        assert_eq!(
            store.list_documents(&orders).await.unwrap(),
            vec!["A1".to_string(), "A10".to_string(), "B2".to_string()]
        );
        assert_eq!(
            store.list_collections(&doc("orders/A1")).await.unwrap(),
            vec!["items".to_string()]
        );
        assert!(store.list_collections(&doc("orders/A10")).await.unwrap().is_empty());

        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_in_memory() {
        let store = SqliteStore::open("scratch", IN_MEMORY).await.unwrap();
        store.set_merge(&doc("a/1"), fields(json!({"k": "v"}))).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        store.checkpoint().await.unwrap();
        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_concurrent_merges_keep_all_fields() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::open("dest", dir.path().join("race.db")).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut f = Fields::new();
                f.insert(format!("log{}", i), crate::value::Value::Bool(true));
                store.set_merge(&doc("logs/2024-06-01"), f).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let merged = store.get(&doc("logs/2024-06-01")).await.unwrap().unwrap();
        assert_eq!(merged.len(), 8);

        store.close().await;
    }

    #[tokio::test]
    async fn test_sqlite_store_corrupt_row_is_serialization_error() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open("dest", dir.path().join("bad.db")).await.unwrap();

        sqlx::query("INSERT INTO documents (path, fields, updated_at) VALUES ('orders/A1', 'not json', 0)")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.get(&doc("orders/A1")).await.unwrap_err();
        assert!(matches!(err, ReplicationError::Serialization(_)));

        store.close().await;
    }

    #[tokio::test]
    async fn test_execute_with_retry_succeeds_immediately() {
        let mut attempt_count = 0;

        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Ok(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt_count, 1);
    }

    #[tokio::test]
    async fn test_execute_with_retry_fails_on_non_busy_error() {
        let mut attempt_count = 0;

        let result: std::result::Result<i32, sqlx::Error> = execute_with_retry("test_op", || {
            attempt_count += 1;
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count, 1);
    }

    #[test]
    fn test_is_sqlite_busy_error_non_database() {
        assert!(!is_sqlite_busy_error(&sqlx::Error::RowNotFound));
        assert!(!is_sqlite_busy_error(&sqlx::Error::PoolTimedOut));
    }
}

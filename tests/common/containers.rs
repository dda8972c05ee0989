// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for Redis.
//!
//! Provides helpers to spin up Redis containers for integration tests.

use fanout_replicator::resilience::RetryConfig;
use fanout_replicator::store::redis::RedisStore;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla Redis container.
///
/// Uses official redis:7 image. Waits for "Ready to accept connections".
pub fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Get the Redis URL for a container.
pub fn redis_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(6379);
    format!("redis://127.0.0.1:{}", port)
}

/// A Redis container acting as one or more document stores.
pub struct TestRedis<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub url: String,
}

impl<'a> TestRedis<'a> {
    pub fn new(docker: &'a Cli) -> Self {
        let container = redis_container(docker);
        let url = redis_url(&container);
        Self { container, url }
    }

    /// Connect a document store over this container under `prefix`.
    pub async fn store(&self, name: &str, prefix: &str) -> RedisStore {
        RedisStore::connect(name, &self.url, prefix, &RetryConfig::testing())
            .await
            .expect("Failed to connect Redis store")
    }

    /// Credential blob for a destination registry entry.
    pub fn blob(&self, prefix: &str) -> String {
        serde_json::json!({"backend": "redis", "url": self.url, "prefix": prefix}).to_string()
    }

    /// Number of keys in the database.
    pub async fn dbsize(&self) -> redis::RedisResult<usize> {
        let client = redis::Client::open(self.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("DBSIZE").query_async(&mut conn).await
    }
}

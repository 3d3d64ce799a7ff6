// SPDX-License-Identifier: Apache-2.0

//! Checksum-keyed request deduplication. Best-effort by design: a cache
//! miss or backend failure only costs a recomputation; correctness comes
//! from the target lock and storage uniqueness, never from here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

#[async_trait]
pub trait IdempotencyBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), String>;
}

pub struct RedisIdempotencyBackend {
    client: redis::Client,
    prefix: String,
}

impl RedisIdempotencyBackend {
    pub fn new(url: &str, prefix: &str) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }
}

#[async_trait]
impl IdempotencyBackend for RedisIdempotencyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| e.to_string())?;
        conn.get(format!("{}:dedup:{key}", self.prefix))
            .await
            .map_err(|e| e.to_string())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| e.to_string())?;
        let _: () = conn
            .set_ex(
                format!("{}:dedup:{key}", self.prefix),
                value,
                ttl.as_secs().max(1),
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// TTL map with lazy expiry, for tests and single-node runs.
#[derive(Default)]
pub struct MemoryIdempotencyBackend {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryIdempotencyBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyBackend for MemoryIdempotencyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), String> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value.to_vec(), now + ttl));
        Ok(())
    }
}

pub struct IdempotencyCache {
    backend: Arc<dyn IdempotencyBackend>,
    ttl: Duration,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(backend: Arc<dyn IdempotencyBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, checksum: &str) -> Option<T> {
        match self.backend.get(checksum).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!("idempotency cache held an undecodable entry: {error}");
                    None
                }
            },
            Ok(None) => None,
            Err(error) => {
                warn!("idempotency cache read failed: {error}");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, checksum: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("idempotency cache encode failed: {error}");
                return;
            }
        };
        if let Err(error) = self.backend.set(checksum, &bytes, self.ttl).await {
            warn!("idempotency cache write failed: {error}");
        }
    }
}

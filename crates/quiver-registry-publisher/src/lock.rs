// SPDX-License-Identifier: Apache-2.0

//! Per-target mutual exclusion across the worker pool. The redis backend is
//! a SET NX PX lease with an owner token; the TTL releases crashed holders.
//! Waiters poll with a bounded budget and honor the request's cancellation
//! signal at the wait boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::warn;
use uuid::Uuid;

use quiver_registry_model::TargetId;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LockError {
    Cancelled,
    Timeout { key: String },
    Backend(String),
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "lock wait cancelled"),
            Self::Timeout { key } => write!(f, "timed out waiting for lock `{key}`"),
            Self::Backend(message) => write!(f, "lock backend error: {message}"),
        }
    }
}

impl std::error::Error for LockError {}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub ttl: Duration,
    pub retry_interval: Duration,
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            retry_interval: Duration::from_millis(100),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
pub trait LockBackend: Send + Sync {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;
    async fn release(&self, key: &str, token: &str) -> Result<(), LockError>;
}

pub struct RedisLockBackend {
    client: redis::Client,
}

impl RedisLockBackend {
    pub fn new(url: &str) -> Result<Self, LockError> {
        let client = redis::Client::open(url).map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(Self { client })
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
  return redis.call("DEL", KEYS[1])
else
  return 0
end
"#;

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(acquired.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), LockError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Single-process backend for tests and standalone deployments.
#[derive(Default)]
pub struct MemoryLockBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for MemoryLockBackend {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some((_, expires)) if *expires > now => Ok(false),
            _ => {
                entries.insert(key.to_string(), (token.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<(), LockError> {
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|(owner, _)| owner == token) {
            entries.remove(key);
        }
        Ok(())
    }
}

pub struct TargetLock {
    backend: Arc<dyn LockBackend>,
    config: LockConfig,
}

pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    token: String,
}

impl LockGuard {
    /// Releases are explicit so they can await; a dropped guard leaves the
    /// lease to its TTL.
    pub async fn release(self) {
        if let Err(error) = self.backend.release(&self.key, &self.token).await {
            warn!(key = %self.key, "lock release failed, lease will expire: {error}");
        }
    }
}

impl TargetLock {
    #[must_use]
    pub fn new(backend: Arc<dyn LockBackend>, config: LockConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn key_for(target: &TargetId) -> String {
        format!("registry:lock:{target}")
    }

    pub async fn acquire(
        &self,
        target: &TargetId,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<LockGuard, LockError> {
        let key = Self::key_for(target);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            if *cancel.borrow() {
                return Err(LockError::Cancelled);
            }
            if self
                .backend
                .try_acquire(&key, &token, self.config.ttl)
                .await?
            {
                return Ok(LockGuard {
                    backend: Arc::clone(&self.backend),
                    key,
                    token,
                });
            }
            if Instant::now() >= deadline {
                return Err(LockError::Timeout { key });
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_interval) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return Err(LockError::Cancelled);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_with(config: LockConfig) -> TargetLock {
        TargetLock::new(Arc::new(MemoryLockBackend::new()), config)
    }

    fn cancel_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let lock = lock_with(LockConfig {
            acquire_timeout: Duration::from_millis(50),
            retry_interval: Duration::from_millis(5),
            ..LockConfig::default()
        });
        let target = TargetId::new("staging").expect("target id");
        let (_tx, mut cancel) = cancel_channel();

        let guard = lock.acquire(&target, &mut cancel).await.expect("first");
        let (_tx2, mut cancel2) = cancel_channel();
        let second = lock.acquire(&target, &mut cancel2).await;
        assert!(matches!(second, Err(LockError::Timeout { .. })));

        guard.release().await;
        let (_tx3, mut cancel3) = cancel_channel();
        let reacquired = lock.acquire(&target, &mut cancel3).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let lock = lock_with(LockConfig {
            acquire_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(10),
            ..LockConfig::default()
        });
        let target = TargetId::new("staging").expect("target id");

        let (_hold_tx, mut hold_cancel) = cancel_channel();
        let _guard = lock.acquire(&target, &mut hold_cancel).await.expect("hold");

        let (cancel_tx, mut cancel_rx) = cancel_channel();
        let waiter = tokio::spawn(async move { lock.acquire(&target, &mut cancel_rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).expect("send cancel");
        let result = waiter.await.expect("join");
        assert!(matches!(result, Err(LockError::Cancelled)));
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let backend = MemoryLockBackend::new();
        assert!(backend
            .try_acquire("registry:lock:staging", "a", Duration::from_millis(5))
            .await
            .expect("acquire"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(backend
            .try_acquire("registry:lock:staging", "b", Duration::from_secs(1))
            .await
            .expect("take over"));
    }

    #[tokio::test]
    async fn release_requires_ownership() {
        let backend = MemoryLockBackend::new();
        assert!(backend
            .try_acquire("registry:lock:staging", "a", Duration::from_secs(1))
            .await
            .expect("acquire"));
        backend
            .release("registry:lock:staging", "not-the-owner")
            .await
            .expect("release");
        assert!(!backend
            .try_acquire("registry:lock:staging", "b", Duration::from_secs(1))
            .await
            .expect("still held"));
    }
}

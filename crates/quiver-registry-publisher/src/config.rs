// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::lock::LockConfig;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Dedup window for retried identical requests. Short on purpose: a
    /// debouncer, not durable memoization.
    pub idempotency_ttl: Duration,
    pub lock: LockConfig,
    /// Cadence of the expired-check purge worker.
    pub purge_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(15),
            lock: LockConfig::default(),
            purge_interval: Duration::from_secs(10 * 60),
        }
    }
}

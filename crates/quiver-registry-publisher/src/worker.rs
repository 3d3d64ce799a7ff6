// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use quiver_registry_store::SqliteStorage;

/// Periodic cleanup of expired schema checks. One transaction per tick;
/// a failed tick is logged and the next one retries.
pub fn spawn_purge_worker(storage: Arc<SqliteStorage>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let storage = Arc::clone(&storage);
            let result =
                tokio::task::spawn_blocking(move || storage.purge_expired_schema_checks(Utc::now()))
                    .await;
            match result {
                Ok(Ok(deleted)) if deleted > 0 => {
                    info!(deleted, "purged expired schema checks");
                }
                Ok(Ok(_)) => {}
                Ok(Err(error)) => warn!("schema check purge failed: {error}"),
                Err(error) => warn!("schema check purge task panicked: {error}"),
            }
        }
    })
}

#![forbid(unsafe_code)]
//! The schema publisher: project models, the per-target distributed lock,
//! the idempotency debouncer, artifact emission, alert fan-out, and the
//! background purge worker. This crate is the only place the registry's
//! pieces meet.

mod alerts;
mod artifacts;
mod config;
mod error;
mod idempotency;
mod lock;
mod models;
mod publisher;
mod worker;

pub use alerts::{
    AlertsError, AlertsPort, NoopAlerts, RecordingAlerts, SchemaChangeNotification,
};
pub use config::RegistryConfig;
pub use error::{PublisherError, Result};
pub use idempotency::{
    IdempotencyBackend, IdempotencyCache, MemoryIdempotencyBackend, RedisIdempotencyBackend,
};
pub use lock::{
    LockBackend, LockConfig, LockError, LockGuard, MemoryLockBackend, RedisLockBackend,
    TargetLock,
};
pub use models::{
    CheckModelInput, ContractState, DeleteModelInput, ModelContext, ModelError, ModelServices,
    PublishModelInput, RegistryModel,
};
pub use publisher::{
    cancellation, CheckResult, DeleteResult, PublishResult, PublisherDeps, SchemaCheckInput,
    SchemaDeleteInput, SchemaPublishInput, SchemaPublisher,
};
pub use worker::spawn_purge_worker;

pub const CRATE_NAME: &str = "quiver-registry-publisher";

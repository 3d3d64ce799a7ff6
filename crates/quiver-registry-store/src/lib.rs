#![forbid(unsafe_code)]
//! Persistence for the registry: the SQLite-backed relational store with
//! transactional action hooks, the content-addressed SDL store, and the
//! object-store backends artifacts are published through.

mod artifacts;
mod error;
mod schema;
mod storage;

pub use artifacts::{
    ArtifactKey, ArtifactKind, ArtifactStoreBackend, ArtifactStoreError, LocalArtifactStore,
    MemoryArtifactStore,
};
pub use error::{Result, StorageError};
pub use schema::{DDL, STORE_SCHEMA_VERSION};
pub use storage::{
    ContractVersionInput, CreateVersionInput, DeleteVersionInput, SchemaPushInput, SqliteStorage,
    VersionOutcomeInput,
};

pub const CRATE_NAME: &str = "quiver-registry-store";

// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use quiver_registry_store::{ArtifactStoreError, StorageError};

use crate::lock::LockError;
use crate::models::ModelError;

pub type Result<T> = std::result::Result<T, PublisherError>;

#[derive(Debug)]
#[non_exhaustive]
pub enum PublisherError {
    /// Malformed input; reported to the client, never retried.
    Validation { message: String },
    Lock(LockError),
    Storage(StorageError),
    /// A capability port failed at the transport level; the operation
    /// aborted with nothing written and is safe to retry.
    Model(ModelError),
    Artifacts(ArtifactStoreError),
    Cancelled,
    Internal { message: String },
}

impl PublisherError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for PublisherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { message } => write!(f, "invalid request: {message}"),
            Self::Lock(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Model(err) => write!(f, "{err}"),
            Self::Artifacts(err) => write!(f, "{err}"),
            Self::Cancelled => write!(f, "request cancelled"),
            Self::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for PublisherError {}

impl From<LockError> for PublisherError {
    fn from(value: LockError) -> Self {
        match value {
            LockError::Cancelled => Self::Cancelled,
            other => Self::Lock(other),
        }
    }
}

impl From<StorageError> for PublisherError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<ModelError> for PublisherError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<ArtifactStoreError> for PublisherError {
    fn from(value: ArtifactStoreError) -> Self {
        Self::Artifacts(value)
    }
}

// SPDX-License-Identifier: Apache-2.0

use std::fmt;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug)]
#[non_exhaustive]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotFound { what: &'static str, key: String },
    Conflict { message: String },
    /// The transactional action hook refused; the surrounding transaction
    /// rolls back.
    ActionFailed { message: String },
    Invariant { message: String },
}

impl StorageError {
    #[must_use]
    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serialization error: {err}"),
            Self::NotFound { what, key } => write!(f, "{what} `{key}` not found"),
            Self::Conflict { message } => write!(f, "conflict: {message}"),
            Self::ActionFailed { message } => write!(f, "transactional action failed: {message}"),
            Self::Invariant { message } => write!(f, "storage invariant violated: {message}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

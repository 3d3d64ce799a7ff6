// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Transport-level failures talking to a composition backend. Validation
/// problems are never errors here; they come back inside the outcome as
/// composition errors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OrchestratorError {
    /// The backend could not be reached or answered outside its protocol.
    /// Callers retry these.
    Unavailable { message: String },
    /// A broken invariant inside the composer itself.
    Internal { message: String },
}

impl OrchestratorError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { message } => write!(f, "orchestrator unavailable: {message}"),
            Self::Internal { message } => write!(f, "orchestrator internal error: {message}"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

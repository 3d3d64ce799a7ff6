// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// What one check stage produced. The conclusion reducers pattern-match on
/// these tags; no stage communicates through nullable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome<C, F> {
    Completed { result: C },
    Failed { reason: F },
    Skipped,
}

impl<C, F> StageOutcome<C, F> {
    #[must_use]
    pub const fn completed(result: C) -> Self {
        Self::Completed { result }
    }

    #[must_use]
    pub const fn failed(reason: F) -> Self {
        Self::Failed { reason }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    #[must_use]
    pub fn completed_ref(&self) -> Option<&C> {
        match self {
            Self::Completed { result } => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn failed_ref(&self) -> Option<&F> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quiver_registry_model::{SchemaPolicyIssue, TargetId};

/// Transport-level failure talking to a policy backend. Rule findings are
/// never errors; they come back inside the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEngineError(pub String);

impl fmt::Display for PolicyEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy engine error: {}", self.0)
    }
}

impl std::error::Error for PolicyEngineError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyOutcome {
    pub warnings: Vec<SchemaPolicyIssue>,
    pub errors: Vec<SchemaPolicyIssue>,
}

impl PolicyOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Evaluates organization policy against a composed document. `sdl` is the
/// full composed schema; `modified_sdl` is the document the user actually
/// pushed, so rules can scope findings to the touched surface.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn check_policy(
        &self,
        target_id: &TargetId,
        sdl: &str,
        modified_sdl: &str,
    ) -> Result<PolicyOutcome, PolicyEngineError>;
}

/// Engine for projects without a policy configuration: everything passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPolicyEngine;

#[async_trait]
impl PolicyEngine for NoopPolicyEngine {
    async fn check_policy(
        &self,
        _target_id: &TargetId,
        _sdl: &str,
        _modified_sdl: &str,
    ) -> Result<PolicyOutcome, PolicyEngineError> {
        Ok(PolicyOutcome::default())
    }
}

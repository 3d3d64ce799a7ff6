// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use quiver_registry_model::{SchemaPolicyIssue, TargetId};
use quiver_registry_policies::{PolicyEngine, PolicyEngineError};

use crate::outcome::StageOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyCheckSuccess {
    pub warnings: Vec<SchemaPolicyIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyCheckFailure {
    pub warnings: Vec<SchemaPolicyIssue>,
    pub errors: Vec<SchemaPolicyIssue>,
}

pub type PolicyCheckOutcome = StageOutcome<PolicyCheckSuccess, PolicyCheckFailure>;

/// Policy stage: skipped entirely when composition produced no document to
/// evaluate. Warnings never fail the stage.
pub async fn run_policy_check(
    engine: &dyn PolicyEngine,
    target_id: &TargetId,
    composed_sdl: Option<&str>,
    modified_sdl: &str,
) -> Result<PolicyCheckOutcome, PolicyEngineError> {
    let Some(sdl) = composed_sdl else {
        return Ok(StageOutcome::Skipped);
    };
    let outcome = engine.check_policy(target_id, sdl, modified_sdl).await?;
    if outcome.is_success() {
        Ok(StageOutcome::completed(PolicyCheckSuccess {
            warnings: outcome.warnings,
        }))
    } else {
        Ok(StageOutcome::failed(PolicyCheckFailure {
            warnings: outcome.warnings,
            errors: outcome.errors,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_registry_policies::RulePolicyEngine;

    #[tokio::test]
    async fn missing_composed_sdl_skips() {
        let outcome = run_policy_check(
            &RulePolicyEngine::new(),
            &TargetId::new("staging").expect("target id"),
            None,
            "type Query { ok: Boolean }",
        )
        .await
        .expect("policy");
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn errors_fail_warnings_pass() {
        let target = TargetId::new("staging").expect("target id");
        let engine = RulePolicyEngine::new();

        let failing = run_policy_check(
            &engine,
            &target,
            Some("type bad_name { f: String }"),
            "type bad_name { f: String }",
        )
        .await
        .expect("policy");
        assert!(failing.is_failed());

        let warning_only = run_policy_check(
            &engine,
            &target,
            Some("type Query { old: String @deprecated }"),
            "type Query { old: String @deprecated }",
        )
        .await
        .expect("policy");
        let success = warning_only.completed_ref().expect("completed");
        assert!(!success.warnings.is_empty());
    }
}

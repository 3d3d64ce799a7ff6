// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quiver_registry_inspect::{diff_schemas, UsageOracle, UsageOracleError, UsageSelector};
use quiver_registry_model::{SchemaChange, SchemaChangeApproval, ServiceSchema};

use crate::approvals::apply_approved_changes;
use crate::federation_filter::filter_out_federation_changes;
use crate::outcome::StageOutcome;
use crate::url_changes::detect_url_changes;

/// The classified change set a diff stage settles on. The same shape is
/// carried on success and failure; what differs is whether any breaking
/// change is still blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaDiffState {
    pub changes: Vec<SchemaChange>,
}

impl SchemaDiffState {
    #[must_use]
    pub fn breaking_changes(&self) -> Vec<&SchemaChange> {
        self.changes.iter().filter(|c| c.is_breaking()).collect()
    }

    #[must_use]
    pub fn safe_changes(&self) -> Vec<&SchemaChange> {
        self.changes.iter().filter(|c| !c.is_breaking()).collect()
    }

    #[must_use]
    pub fn blocking_changes(&self) -> Vec<&SchemaChange> {
        self.changes.iter().filter(|c| c.is_blocking()).collect()
    }
}

pub type DiffCheckOutcome = StageOutcome<SchemaDiffState, SchemaDiffState>;

pub struct DiffCheckInput<'a> {
    pub existing_sdl: Option<&'a str>,
    pub incoming_sdl: Option<&'a str>,
    pub selector: &'a UsageSelector,
    pub approved_changes: &'a BTreeMap<String, SchemaChangeApproval>,
    pub filter_federation_changes: bool,
    /// Before/after service sets; present only on composite publish and
    /// delete paths where URL moves are part of the reported change set.
    pub url_changes: Option<(&'a [ServiceSchema], &'a [ServiceSchema])>,
}

/// Diff stage: classify, filter, apply approvals, enrich with usage, and
/// append URL moves. Fails when a breaking change survives all three forms
/// of relief (usage-safety, approval, non-breaking classification). Skips
/// when either document is absent or unparseable.
pub async fn run_diff_check(
    input: DiffCheckInput<'_>,
    oracle: &dyn UsageOracle,
) -> Result<DiffCheckOutcome, UsageOracleError> {
    let diffed = diff_schemas(
        input.existing_sdl,
        input.incoming_sdl,
        input.selector,
        oracle,
    )
    .await?;

    let Some(mut changes) = diffed else {
        return Ok(StageOutcome::Skipped);
    };

    if input.filter_federation_changes {
        changes = filter_out_federation_changes(changes);
    }
    apply_approved_changes(&mut changes, input.approved_changes);

    if let Some((before, after)) = input.url_changes {
        changes.extend(detect_url_changes(before, after));
    }

    let state = SchemaDiffState { changes };
    if state.blocking_changes().is_empty() {
        Ok(StageOutcome::completed(state))
    } else {
        Ok(StageOutcome::failed(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quiver_registry_inspect::{NoUsageOracle, StaticUsageOracle};
    use quiver_registry_model::{
        ChangeApprovalMetadata, ContextId, SchemaCheckId, TargetId,
    };

    fn selector() -> UsageSelector {
        UsageSelector::new(TargetId::new("staging").expect("target id"), 30, 0.0)
    }

    fn input<'a>(
        existing: Option<&'a str>,
        incoming: Option<&'a str>,
        selector: &'a UsageSelector,
        approved: &'a BTreeMap<String, SchemaChangeApproval>,
    ) -> DiffCheckInput<'a> {
        DiffCheckInput {
            existing_sdl: existing,
            incoming_sdl: incoming,
            selector,
            approved_changes: approved,
            filter_federation_changes: false,
            url_changes: None,
        }
    }

    #[tokio::test]
    async fn breaking_change_fails_the_stage() {
        let sel = selector();
        let approved = BTreeMap::new();
        let outcome = run_diff_check(
            input(
                Some("type Query { name: String! }"),
                Some("type Query { name: Int! }"),
                &sel,
                &approved,
            ),
            &NoUsageOracle,
        )
        .await
        .expect("diff");
        let state = outcome.failed_ref().expect("failed");
        assert_eq!(state.breaking_changes().len(), 1);
    }

    #[tokio::test]
    async fn usage_safe_breaking_change_completes() {
        let sel = selector();
        let approved = BTreeMap::new();
        let oracle = StaticUsageOracle::new(["Query.name".to_string()]);
        let outcome = run_diff_check(
            input(
                Some("type Query { name: String! }"),
                Some("type Query { name: Int! }"),
                &sel,
                &approved,
            ),
            &oracle,
        )
        .await
        .expect("diff");
        let state = outcome.completed_ref().expect("completed");
        assert_eq!(state.breaking_changes().len(), 1);
        assert!(state.breaking_changes()[0].is_safe_based_on_usage);
    }

    #[tokio::test]
    async fn approved_breaking_change_completes_with_approver() {
        let sel = selector();
        // First pass to learn the change id.
        let empty = BTreeMap::new();
        let first = run_diff_check(
            input(
                Some("type Query { name: String! }"),
                Some("type Query { name: Int! }"),
                &sel,
                &empty,
            ),
            &NoUsageOracle,
        )
        .await
        .expect("diff");
        let detected = first.failed_ref().expect("failed").changes[0].clone();

        let mut snapshot = detected.clone();
        snapshot.approval = Some(ChangeApprovalMetadata {
            approved_by: "reviewer".to_string(),
            approved_at: Utc::now(),
            schema_check_id: SchemaCheckId::generate(),
        });
        let approved = BTreeMap::from([(
            detected.id.clone(),
            SchemaChangeApproval {
                target_id: TargetId::new("staging").expect("target id"),
                context_id: ContextId::new("repo#42").expect("context id"),
                schema_change_id: detected.id.clone(),
                change: snapshot,
                approved_by: "reviewer".to_string(),
                approved_at: Utc::now(),
            },
        )]);

        let second = run_diff_check(
            input(
                Some("type Query { name: String! }"),
                Some("type Query { name: Int! }"),
                &sel,
                &approved,
            ),
            &NoUsageOracle,
        )
        .await
        .expect("diff");
        let state = second.completed_ref().expect("completed");
        assert_eq!(state.breaking_changes().len(), 1);
        assert_eq!(
            state.breaking_changes()[0]
                .approval
                .as_ref()
                .expect("approval")
                .approved_by,
            "reviewer"
        );
    }

    #[tokio::test]
    async fn missing_side_skips() {
        let sel = selector();
        let approved = BTreeMap::new();
        let outcome = run_diff_check(
            input(None, Some("type Query { ok: Boolean }"), &sel, &approved),
            &NoUsageOracle,
        )
        .await
        .expect("diff");
        assert!(outcome.is_skipped());
    }

    #[tokio::test]
    async fn url_moves_ride_along_with_the_diff() {
        let sel = selector();
        let approved = BTreeMap::new();
        let before = [ServiceSchema::new(
            "users",
            "type Query { me: String }",
            Some("https://a".to_string()),
        )];
        let after = [ServiceSchema::new(
            "users",
            "type Query { me: String }",
            Some("https://b".to_string()),
        )];
        let outcome = run_diff_check(
            DiffCheckInput {
                existing_sdl: Some("type Query { me: String }"),
                incoming_sdl: Some("type Query { me: String }"),
                selector: &sel,
                approved_changes: &approved,
                filter_federation_changes: false,
                url_changes: Some((&before, &after)),
            },
            &NoUsageOracle,
        )
        .await
        .expect("diff");
        let state = outcome.completed_ref().expect("completed");
        assert_eq!(state.changes.len(), 1);
        assert_eq!(
            state.changes[0].change_type,
            quiver_registry_model::SchemaChangeType::RegistryServiceUrlChanged
        );
    }
}

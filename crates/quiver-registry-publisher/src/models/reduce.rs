// SPDX-License-Identifier: Apache-2.0

//! Folding per-stage outcomes into conclusions. Shared by the single and
//! composite families so the two reduce identically wherever their
//! pipelines overlap.

use quiver_registry_checks::{
    CompositionCheckOutcome, DiffCheckOutcome, PolicyCheckOutcome, SchemaDiffState, StageOutcome,
};
use quiver_registry_compose::ContractCompositionOutcome;
use quiver_registry_model::{
    CompositionSuccessState, ContractCheckResult, ContractPublishState, SchemaChange,
    SchemaCheckConclusion, SchemaCheckFailureState, SchemaCheckSuccessState, SchemaDeleteState,
    SchemaPublishState,
};

pub(crate) fn diff_state(diff: &DiffCheckOutcome) -> SchemaDiffState {
    match diff {
        StageOutcome::Completed { result } => result.clone(),
        StageOutcome::Failed { reason } => reason.clone(),
        StageOutcome::Skipped => SchemaDiffState::default(),
    }
}

fn owned_changes(state: &SchemaDiffState) -> (Vec<SchemaChange>, Vec<SchemaChange>) {
    let breaking = state
        .breaking_changes()
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();
    let safe = state.safe_changes().into_iter().cloned().collect::<Vec<_>>();
    (breaking, safe)
}

/// Fold check stages into the conclusion. When `accept_breaking` is set
/// (legacy `force`), a failing diff no longer fails the check; everything
/// else still does.
pub(crate) fn reduce_check(
    composition: &CompositionCheckOutcome,
    diff: &DiffCheckOutcome,
    policy: &PolicyCheckOutcome,
    contract_checks: Vec<ContractCheckResult>,
    accept_breaking: bool,
) -> SchemaCheckConclusion {
    let diff_failed = diff.is_failed() && !accept_breaking;
    let contracts_failed = contract_checks.iter().any(|c| !c.is_successful);
    let failed =
        composition.is_failed() || diff_failed || policy.is_failed() || contracts_failed;

    let diffed = diff_state(diff);
    if !failed {
        let composition_state = composition.completed_ref().map(|success| {
            CompositionSuccessState {
                composite_schema_sdl: success.composite_schema_sdl.clone(),
                supergraph_sdl: success.supergraph_sdl.clone(),
                tags: success.tags.clone(),
            }
        });
        let warnings = match policy {
            StageOutcome::Completed { result } => result.warnings.clone(),
            _ => Vec::new(),
        };
        return SchemaCheckConclusion::Success {
            state: Some(SchemaCheckSuccessState {
                composition: composition_state,
                schema_changes: diffed.changes,
                schema_policy_warnings: warnings,
                contract_checks,
            }),
        };
    }

    let (breaking, safe) = owned_changes(&diffed);
    let (composition_errors, composite_sdl, supergraph_sdl) = match composition {
        StageOutcome::Failed { reason } => (
            reason.errors.clone(),
            reason.composite_schema_sdl.clone(),
            reason.supergraph_sdl.clone(),
        ),
        StageOutcome::Completed { result } => (
            Vec::new(),
            Some(result.composite_schema_sdl.clone()),
            result.supergraph_sdl.clone(),
        ),
        StageOutcome::Skipped => (Vec::new(), None, None),
    };
    let (policy_warnings, policy_errors) = match policy {
        StageOutcome::Completed { result } => (result.warnings.clone(), Vec::new()),
        StageOutcome::Failed { reason } => (reason.warnings.clone(), reason.errors.clone()),
        StageOutcome::Skipped => (Vec::new(), Vec::new()),
    };

    SchemaCheckConclusion::Failure {
        state: SchemaCheckFailureState {
            composition_errors,
            breaking_changes: breaking,
            safe_changes: safe,
            schema_policy_warnings: policy_warnings,
            schema_policy_errors: policy_errors,
            contract_checks,
            composite_schema_sdl: composite_sdl,
            supergraph_sdl,
        },
    }
}

pub(crate) fn contract_publish_states(
    contracts: Option<&[ContractCompositionOutcome]>,
) -> Vec<ContractPublishState> {
    contracts
        .unwrap_or_default()
        .iter()
        .map(|contract| ContractPublishState {
            contract_id: contract.id,
            contract_name: contract.name.clone(),
            is_composable: contract.errors.is_empty() && contract.sdl.is_some(),
            composite_schema_sdl: contract.sdl.clone(),
            supergraph_sdl: contract.supergraph.clone(),
            composition_errors: contract.errors.clone(),
            changes: Vec::new(),
        })
        .collect()
}

pub(crate) fn build_publish_state(
    composition: &CompositionCheckOutcome,
    diff: &DiffCheckOutcome,
    initial: bool,
) -> SchemaPublishState {
    let diffed = diff_state(diff);
    let (breaking, _) = owned_changes(&diffed);
    match composition {
        StageOutcome::Completed { result } => SchemaPublishState {
            composable: true,
            initial,
            changes: diffed.changes,
            breaking_changes: breaking,
            composition_errors: Vec::new(),
            full_schema_sdl: Some(result.composite_schema_sdl.clone()),
            supergraph_sdl: result.supergraph_sdl.clone(),
            tags: result.tags.clone(),
            contracts: contract_publish_states(result.contracts.as_deref()),
        },
        StageOutcome::Failed { reason } => SchemaPublishState {
            composable: false,
            initial,
            changes: diffed.changes,
            breaking_changes: breaking,
            composition_errors: reason.errors.clone(),
            full_schema_sdl: reason.composite_schema_sdl.clone(),
            supergraph_sdl: reason.supergraph_sdl.clone(),
            tags: reason.tags.clone(),
            contracts: contract_publish_states(reason.contracts.as_deref()),
        },
        StageOutcome::Skipped => SchemaPublishState {
            composable: false,
            initial,
            changes: diffed.changes,
            breaking_changes: breaking,
            composition_errors: Vec::new(),
            full_schema_sdl: None,
            supergraph_sdl: None,
            tags: None,
            contracts: Vec::new(),
        },
    }
}

pub(crate) fn build_delete_state(
    composition: &CompositionCheckOutcome,
    diff: &DiffCheckOutcome,
) -> SchemaDeleteState {
    let publish = build_publish_state(composition, diff, false);
    SchemaDeleteState {
        composable: publish.composable,
        changes: publish.changes,
        breaking_changes: publish.breaking_changes,
        composition_errors: publish.composition_errors,
        full_schema_sdl: publish.full_schema_sdl,
        supergraph_sdl: publish.supergraph_sdl,
        tags: publish.tags,
    }
}

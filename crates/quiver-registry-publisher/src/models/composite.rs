// SPDX-License-Identifier: Apache-2.0

//! The composite family (federation and stitching). Operations address a
//! named service inside the target's registered set; the new set is formed
//! by swapping, appending, or removing that entry before composition.

use quiver_registry_checks::{
    run_checksum_check, run_composition_check, run_diff_check, run_metadata_check,
    run_policy_check, run_service_name_check, run_service_url_check, DiffCheckInput,
    MetadataFailure, ServiceUrlFailure, StageOutcome,
};
use quiver_registry_compose::ContractCompositionOutcome;
use quiver_registry_model::{
    to_service_schemas, CompositionError, ContractCheckResult, DeleteRejectReason,
    PublishIgnoreReason, PublishRejectReason, SchemaCheckConclusion, SchemaCheckFailureState,
    SchemaDeleteConclusion, SchemaPublishConclusion, ServiceSchema,
};

use super::reduce::{build_delete_state, build_publish_state, diff_state, reduce_check};
use super::{
    CheckModelInput, ContractState, DeleteModelInput, ModelContext, ModelError, ModelServices,
    PublishModelInput,
};

fn registered_schemas(ctx: &ModelContext) -> Vec<ServiceSchema> {
    ctx.latest_version
        .as_ref()
        .map(|version| to_service_schemas(&version.schemas))
        .unwrap_or_default()
}

/// Replace the entry with the same service name, or append.
fn with_service(mut set: Vec<ServiceSchema>, incoming: ServiceSchema) -> Vec<ServiceSchema> {
    match set.iter_mut().find(|s| s.name == incoming.name) {
        Some(slot) => *slot = incoming,
        None => set.push(incoming),
    }
    set.sort_by(|a, b| a.name.cmp(&b.name));
    set
}

fn without_service(set: Vec<ServiceSchema>, service_name: &str) -> Vec<ServiceSchema> {
    set.into_iter()
        .filter(|s| s.name != service_name)
        .collect()
}

fn missing_service_name_failure() -> SchemaCheckConclusion {
    SchemaCheckConclusion::Failure {
        state: SchemaCheckFailureState {
            composition_errors: vec![CompositionError::composition(
                "a service name is required to check a composite project",
            )],
            ..SchemaCheckFailureState::default()
        },
    }
}

pub(super) async fn check(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    input: &CheckModelInput,
    legacy: bool,
) -> Result<SchemaCheckConclusion, ModelError> {
    let service_name = match run_service_name_check(input.service_name.as_deref()) {
        StageOutcome::Completed { result } => result,
        _ => return Ok(missing_service_name_failure()),
    };

    let registered = registered_schemas(ctx);
    let existing_url = registered
        .iter()
        .find(|s| s.name == service_name)
        .and_then(|s| s.url.clone());
    let schemas = with_service(
        registered.clone(),
        ServiceSchema::new(service_name.clone(), input.sdl.clone(), existing_url),
    );

    let checksum = run_checksum_check(
        &schemas,
        ctx.base_schema.as_deref(),
        ctx.latest_version.as_ref().map(|_| registered.as_slice()),
        ctx.base_schema.as_deref(),
    );
    if checksum.is_unchanged() {
        return Ok(SchemaCheckConclusion::Success { state: None });
    }

    let with_contracts = !legacy;
    let composition = run_composition_check(
        services.orchestrator,
        ctx.project.project_type,
        &schemas,
        &ctx.composition_options(with_contracts),
    )
    .await?;

    let (composed_sdl, contract_outcomes) = match &composition {
        StageOutcome::Completed { result } => (
            Some(result.composite_schema_sdl.as_str()),
            result.contracts.as_deref(),
        ),
        StageOutcome::Failed { reason } => (
            reason.composite_schema_sdl.as_deref(),
            reason.contracts.as_deref(),
        ),
        StageOutcome::Skipped => (None, None),
    };
    let baseline_sdl = ctx
        .baseline_version()
        .and_then(|v| v.composite_schema_sdl.as_deref());
    let selector = ctx.usage_selector();

    let diff = run_diff_check(
        DiffCheckInput {
            existing_sdl: baseline_sdl,
            incoming_sdl: composed_sdl,
            selector: &selector,
            approved_changes: &ctx.approved_changes,
            filter_federation_changes: ctx.filter_federation_changes(),
            url_changes: None,
        },
        services.usage,
    )
    .await
    .map_err(ModelError::Usage)?;

    let mut contract_checks = Vec::new();
    if let Some(outcomes) = contract_outcomes {
        for outcome in outcomes {
            contract_checks
                .push(check_contract(services, ctx, &selector, outcome).await?);
        }
    }

    let policy = if legacy {
        StageOutcome::Skipped
    } else {
        run_policy_check(services.policy, &ctx.target.id, composed_sdl, &input.sdl)
            .await
            .map_err(ModelError::Policy)?
    };

    let accept_breaking =
        legacy && (input.force || input.experimental_accept_breaking_changes);
    Ok(reduce_check(
        &composition,
        &diff,
        &policy,
        contract_checks,
        accept_breaking,
    ))
}

/// One contract check: its composition outcome plus an independent diff
/// against the contract's previous valid composed document. A failure here
/// never leaks into another contract's result.
async fn check_contract(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    selector: &quiver_registry_inspect::UsageSelector,
    outcome: &ContractCompositionOutcome,
) -> Result<ContractCheckResult, ModelError> {
    let state = ctx
        .contracts
        .iter()
        .find(|s: &&ContractState| s.contract.id == outcome.id);
    let previous_sdl = state
        .and_then(|s| s.latest_valid.as_ref())
        .and_then(|v| v.composite_schema_sdl.as_deref());

    if !outcome.errors.is_empty() || outcome.sdl.is_none() {
        return Ok(ContractCheckResult {
            contract_id: outcome.id,
            contract_name: outcome.name.clone(),
            is_successful: false,
            composition_errors: outcome.errors.clone(),
            breaking_changes: Vec::new(),
            safe_changes: Vec::new(),
            composite_schema_sdl: outcome.sdl.clone(),
            supergraph_sdl: outcome.supergraph.clone(),
        });
    }

    let diff = run_diff_check(
        DiffCheckInput {
            existing_sdl: previous_sdl,
            incoming_sdl: outcome.sdl.as_deref(),
            selector,
            approved_changes: &ctx.approved_changes,
            filter_federation_changes: ctx.filter_federation_changes(),
            url_changes: None,
        },
        services.usage,
    )
    .await
    .map_err(ModelError::Usage)?;

    let failed = diff.is_failed();
    let state = diff_state(&diff);
    Ok(ContractCheckResult {
        contract_id: outcome.id,
        contract_name: outcome.name.clone(),
        is_successful: !failed,
        composition_errors: Vec::new(),
        breaking_changes: state
            .breaking_changes()
            .into_iter()
            .cloned()
            .collect(),
        safe_changes: state.safe_changes().into_iter().cloned().collect(),
        composite_schema_sdl: outcome.sdl.clone(),
        supergraph_sdl: outcome.supergraph.clone(),
    })
}

pub(super) async fn publish(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    input: &PublishModelInput,
    legacy: bool,
) -> Result<SchemaPublishConclusion, ModelError> {
    let service_name = match run_service_name_check(input.service_name.as_deref()) {
        StageOutcome::Completed { result } => result,
        _ => {
            return Ok(SchemaPublishConclusion::Reject {
                reason: PublishRejectReason::MissingServiceName,
            })
        }
    };

    let registered = registered_schemas(ctx);
    let existing_url = registered
        .iter()
        .find(|s| s.name == service_name)
        .and_then(|s| s.url.clone());
    let url = match run_service_url_check(input.service_url.as_deref(), existing_url.as_deref()) {
        StageOutcome::Completed { result } => result,
        StageOutcome::Failed { reason } => {
            let reason = match reason {
                ServiceUrlFailure::Missing => PublishRejectReason::MissingServiceUrl,
                ServiceUrlFailure::Invalid { given } => {
                    PublishRejectReason::InvalidServiceUrl { given }
                }
            };
            return Ok(SchemaPublishConclusion::Reject { reason });
        }
        StageOutcome::Skipped => {
            return Ok(SchemaPublishConclusion::Reject {
                reason: PublishRejectReason::MissingServiceUrl,
            })
        }
    };

    let incoming = ServiceSchema::new(
        service_name.clone(),
        input.sdl.clone(),
        Some(url.url().to_string()),
    );
    let schemas = with_service(registered.clone(), incoming);

    let checksum = run_checksum_check(
        &schemas,
        ctx.base_schema.as_deref(),
        ctx.latest_version.as_ref().map(|_| registered.as_slice()),
        ctx.base_schema.as_deref(),
    );
    if checksum.is_unchanged() {
        return Ok(SchemaPublishConclusion::Ignore {
            reason: PublishIgnoreReason::NoChanges,
        });
    }

    let existing_metadata = ctx.latest_version.as_ref().and_then(|version| {
        version
            .schemas
            .iter()
            .find(|p| p.service_name == service_name)
            .and_then(|p| p.metadata.clone())
    });
    let metadata = run_metadata_check(input.metadata.as_deref(), existing_metadata.as_ref());
    if let Some(MetadataFailure::ParsingFailure { message }) = metadata.failed_ref() {
        return Ok(SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::MetadataParsingFailure {
                message: message.clone(),
            },
        });
    }

    let with_contracts = !legacy;
    let composition = run_composition_check(
        services.orchestrator,
        ctx.project.project_type,
        &schemas,
        &ctx.composition_options(with_contracts),
    )
    .await?;

    let composed_sdl = match &composition {
        StageOutcome::Completed { result } => Some(result.composite_schema_sdl.as_str()),
        StageOutcome::Failed { reason } => reason.composite_schema_sdl.as_deref(),
        StageOutcome::Skipped => None,
    };
    let baseline_sdl = ctx
        .baseline_version()
        .and_then(|v| v.composite_schema_sdl.as_deref());
    let selector = ctx.usage_selector();

    let diff = run_diff_check(
        DiffCheckInput {
            existing_sdl: baseline_sdl,
            incoming_sdl: composed_sdl,
            selector: &selector,
            approved_changes: &ctx.approved_changes,
            filter_federation_changes: ctx.filter_federation_changes(),
            url_changes: Some((&registered, &schemas)),
        },
        services.usage,
    )
    .await
    .map_err(ModelError::Usage)?;

    // Comparing to latest leaves no room for a non-composable head: any
    // failed composition rejects. The composable-baseline mode records the
    // version as non-composable instead, keeping the emitted SDL for
    // diagnostics.
    if let StageOutcome::Failed { reason } = &composition {
        if ctx.compare_to_latest() {
            return Ok(SchemaPublishConclusion::Reject {
                reason: PublishRejectReason::CompositionFailure {
                    errors: reason.errors.clone(),
                },
            });
        }
    }

    if legacy && !(input.force || input.experimental_accept_breaking_changes) {
        let blocking: Vec<_> = diff_state(&diff)
            .blocking_changes()
            .into_iter()
            .cloned()
            .collect();
        if !blocking.is_empty() {
            return Ok(SchemaPublishConclusion::Reject {
                reason: PublishRejectReason::BreakingChanges { changes: blocking },
            });
        }
    }

    let initial = ctx.latest_version.is_none();
    Ok(SchemaPublishConclusion::Publish {
        state: build_publish_state(&composition, &diff, initial),
    })
}

pub(super) async fn delete(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    input: &DeleteModelInput,
    legacy: bool,
) -> Result<SchemaDeleteConclusion, ModelError> {
    let service_name = match run_service_name_check(Some(input.service_name.as_str())) {
        StageOutcome::Completed { result } => result,
        _ => {
            return Ok(SchemaDeleteConclusion::Reject {
                reason: DeleteRejectReason::MissingServiceName,
            })
        }
    };

    let registered = registered_schemas(ctx);
    if !registered.iter().any(|s| s.name == service_name) {
        return Ok(SchemaDeleteConclusion::Reject {
            reason: DeleteRejectReason::UnknownServiceName {
                given: service_name,
            },
        });
    }
    let schemas = without_service(registered.clone(), &service_name);

    let with_contracts = !legacy;
    let composition = run_composition_check(
        services.orchestrator,
        ctx.project.project_type,
        &schemas,
        &ctx.composition_options(with_contracts),
    )
    .await?;

    let composed_sdl = match &composition {
        StageOutcome::Completed { result } => Some(result.composite_schema_sdl.as_str()),
        StageOutcome::Failed { reason } => reason.composite_schema_sdl.as_deref(),
        StageOutcome::Skipped => None,
    };
    let baseline_sdl = ctx
        .baseline_version()
        .and_then(|v| v.composite_schema_sdl.as_deref());
    let selector = ctx.usage_selector();

    let diff = run_diff_check(
        DiffCheckInput {
            existing_sdl: baseline_sdl,
            incoming_sdl: composed_sdl,
            selector: &selector,
            approved_changes: &ctx.approved_changes,
            filter_federation_changes: ctx.filter_federation_changes(),
            url_changes: Some((&registered, &schemas)),
        },
        services.usage,
    )
    .await
    .map_err(ModelError::Usage)?;

    if let StageOutcome::Failed { reason } = &composition {
        if ctx.compare_to_latest() {
            return Ok(SchemaDeleteConclusion::Reject {
                reason: DeleteRejectReason::CompositionFailure {
                    errors: reason.errors.clone(),
                },
            });
        }
    }

    Ok(SchemaDeleteConclusion::Accept {
        state: build_delete_state(&composition, &diff),
    })
}

// SPDX-License-Identifier: Apache-2.0

//! The single-schema family. One document per target; the service set
//! always holds exactly one entry named after the project.

use quiver_registry_checks::{
    run_checksum_check, run_composition_check, run_diff_check, run_metadata_check,
    run_policy_check, DiffCheckInput, MetadataFailure, StageOutcome,
};
use quiver_registry_model::{
    to_service_schemas, ProjectType, PublishIgnoreReason, PublishRejectReason,
    SchemaCheckConclusion, SchemaPublishConclusion, ServiceSchema,
};

use super::reduce::{build_publish_state, diff_state, reduce_check};
use super::{CheckModelInput, ModelContext, ModelError, ModelServices, PublishModelInput};

fn incoming_service(ctx: &ModelContext, sdl: &str) -> ServiceSchema {
    ServiceSchema::new(ctx.project.id.as_str(), sdl, None)
}

fn baseline_schemas(ctx: &ModelContext) -> Option<Vec<ServiceSchema>> {
    ctx.latest_version
        .as_ref()
        .map(|version| to_service_schemas(&version.schemas))
}

pub(super) async fn check(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    input: &CheckModelInput,
    legacy: bool,
) -> Result<SchemaCheckConclusion, ModelError> {
    let schemas = vec![incoming_service(ctx, &input.sdl)];

    let baseline = baseline_schemas(ctx);
    let checksum = run_checksum_check(
        &schemas,
        ctx.base_schema.as_deref(),
        baseline.as_deref(),
        ctx.base_schema.as_deref(),
    );
    if checksum.is_unchanged() {
        return Ok(SchemaCheckConclusion::Success { state: None });
    }

    let composition = run_composition_check(
        services.orchestrator,
        ProjectType::Single,
        &schemas,
        &ctx.composition_options(false),
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
            filter_federation_changes: false,
            url_changes: None,
        },
        services.usage,
    )
    .await
    .map_err(ModelError::Usage)?;

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
        Vec::new(),
        accept_breaking,
    ))
}

pub(super) async fn publish(
    services: ModelServices<'_>,
    ctx: &ModelContext,
    input: &PublishModelInput,
    legacy: bool,
) -> Result<SchemaPublishConclusion, ModelError> {
    let schemas = vec![incoming_service(ctx, &input.sdl)];

    let baseline = baseline_schemas(ctx);
    let checksum = run_checksum_check(
        &schemas,
        ctx.base_schema.as_deref(),
        baseline.as_deref(),
        ctx.base_schema.as_deref(),
    );
    if checksum.is_unchanged() {
        return Ok(SchemaPublishConclusion::Ignore {
            reason: PublishIgnoreReason::NoChanges,
        });
    }

    let existing_metadata = ctx
        .latest_version
        .as_ref()
        .and_then(|v| v.schemas.first())
        .and_then(|push| push.metadata.clone());
    let metadata = run_metadata_check(input.metadata.as_deref(), existing_metadata.as_ref());
    if let Some(MetadataFailure::ParsingFailure { message }) = metadata.failed_ref() {
        return Ok(SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::MetadataParsingFailure {
                message: message.clone(),
            },
        });
    }

    let composition = run_composition_check(
        services.orchestrator,
        ProjectType::Single,
        &schemas,
        &ctx.composition_options(false),
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
            filter_federation_changes: false,
            url_changes: None,
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

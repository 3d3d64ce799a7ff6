// SPDX-License-Identifier: Apache-2.0

//! The top-level orchestration: load context, take the per-target lock,
//! dispatch to the right project model, persist the conclusion, publish
//! artifacts inside the storage transaction, and fan out notifications.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use quiver_registry_compose::Orchestrator;
use quiver_registry_core::stable_json_hash_hex;
use quiver_registry_inspect::UsageOracle;
use quiver_registry_model::{
    ChangeSeverity, ContextId, Contract, ContractId, ExternalCompositionConfig,
    GitHubIntegrationMetadata, ProjectId, SchemaCheck, SchemaCheckConclusion, SchemaCheckId,
    SchemaDeleteConclusion, SchemaPublishConclusion, SchemaPublishState, SchemaVersion,
    SchemaVersionId, TargetId,
};
use quiver_registry_policies::PolicyEngine;
use quiver_registry_store::{
    ArtifactStoreBackend, ContractVersionInput, CreateVersionInput, DeleteVersionInput,
    SchemaPushInput, SqliteStorage, VersionOutcomeInput,
};

use crate::alerts::{AlertsPort, SchemaChangeNotification};
use crate::artifacts::{publish_version_artifacts, ContractArtifacts};
use crate::config::RegistryConfig;
use crate::error::{PublisherError, Result};
use crate::idempotency::{IdempotencyBackend, IdempotencyCache};
use crate::lock::{LockBackend, TargetLock};
use crate::models::{
    CheckModelInput, ContractState, DeleteModelInput, ModelContext, ModelServices,
    PublishModelInput, RegistryModel,
};

/// A fresh cancellation pair. Hold the sender; dropping it reads as a
/// cancel at the next wait boundary.
#[must_use]
pub fn cancellation() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

pub struct PublisherDeps {
    pub storage: Arc<SqliteStorage>,
    pub artifacts: Arc<dyn ArtifactStoreBackend>,
    pub orchestrator: Arc<dyn Orchestrator>,
    pub policy: Arc<dyn PolicyEngine>,
    pub usage: Arc<dyn UsageOracle>,
    pub alerts: Arc<dyn AlertsPort>,
    pub lock_backend: Arc<dyn LockBackend>,
    pub idempotency_backend: Arc<dyn IdempotencyBackend>,
}

pub struct SchemaPublisher {
    storage: Arc<SqliteStorage>,
    artifacts: Arc<dyn ArtifactStoreBackend>,
    orchestrator: Arc<dyn Orchestrator>,
    policy: Arc<dyn PolicyEngine>,
    usage: Arc<dyn UsageOracle>,
    alerts: Arc<dyn AlertsPort>,
    lock: TargetLock,
    idempotency: IdempotencyCache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCheckInput {
    pub target_id: TargetId,
    pub sdl: String,
    pub service_name: Option<String>,
    pub context_id: Option<String>,
    pub github: Option<GitHubIntegrationMetadata>,
    pub force: bool,
    pub experimental_accept_breaking_changes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPublishInput {
    pub target_id: TargetId,
    pub sdl: String,
    pub service_name: Option<String>,
    pub service_url: Option<String>,
    pub metadata: Option<String>,
    pub author: String,
    pub commit: String,
    pub force: bool,
    pub experimental_accept_breaking_changes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDeleteInput {
    pub target_id: TargetId,
    pub service_name: String,
    pub author: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: SchemaCheckId,
    pub conclusion: SchemaCheckConclusion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub conclusion: SchemaPublishConclusion,
    pub schema_version_id: Option<SchemaVersionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResult {
    pub conclusion: SchemaDeleteConclusion,
    pub schema_version_id: Option<SchemaVersionId>,
}

impl SchemaPublisher {
    #[must_use]
    pub fn new(deps: PublisherDeps, config: RegistryConfig) -> Self {
        Self {
            storage: deps.storage,
            artifacts: deps.artifacts,
            orchestrator: deps.orchestrator,
            policy: deps.policy,
            usage: deps.usage,
            alerts: deps.alerts,
            lock: TargetLock::new(deps.lock_backend, config.lock.clone()),
            idempotency: IdempotencyCache::new(deps.idempotency_backend, config.idempotency_ttl),
        }
    }

    fn services(&self) -> ModelServices<'_> {
        ModelServices {
            orchestrator: self.orchestrator.as_ref(),
            policy: self.policy.as_ref(),
            usage: self.usage.as_ref(),
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<SqliteStorage>) -> quiver_registry_store::Result<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || op(storage))
            .await
            .map_err(|e| PublisherError::internal(format!("storage task panicked: {e}")))?
            .map_err(PublisherError::from)
    }

    async fn load_context(
        &self,
        target_id: &TargetId,
        context_id: Option<ContextId>,
    ) -> Result<ModelContext> {
        let target_id = target_id.clone();
        self.run_blocking(move |storage| {
            let target = storage.get_target(&target_id)?;
            let project = storage.get_project(&target.project_id)?;
            let organization = storage.get_organization(&target.org_id)?;
            let latest_version = storage.get_maybe_latest_version(&target_id)?;
            let latest_composable_version = storage.get_maybe_latest_valid_version(&target_id)?;
            let base_schema = storage.get_base_schema(&target_id)?;
            let approved_changes = match &context_id {
                Some(context_id) => {
                    storage.get_approved_schema_changes_for_context_id(&target_id, context_id)?
                }
                None => BTreeMap::new(),
            };
            let contracts = if project.project_type.supports_contracts()
                && !project.legacy_registry_model
            {
                storage
                    .get_active_contracts(&target_id)?
                    .into_iter()
                    .map(|contract| {
                        let latest_valid =
                            storage.get_latest_valid_contract_version(&contract.id)?;
                        Ok(ContractState {
                            contract,
                            latest_valid,
                        })
                    })
                    .collect::<quiver_registry_store::Result<Vec<_>>>()?
            } else {
                Vec::new()
            };
            let compare_to_previous_composable = project.compare_to_previous_composable_version;
            Ok(ModelContext {
                organization,
                project,
                target,
                latest_version,
                latest_composable_version,
                base_schema,
                approved_changes,
                contracts,
                compare_to_previous_composable,
            })
        })
        .await
    }

    // ---- check ------------------------------------------------------------

    /// Advisory: takes no lock and tolerates a stale baseline. Always
    /// records a check row, success or failure.
    pub async fn check(&self, input: SchemaCheckInput) -> Result<CheckResult> {
        let context_id = resolve_context_id(input.context_id.as_deref(), input.github.as_ref())?;

        let ctx = self.load_context(&input.target_id, context_id.clone()).await?;

        // The approval set is part of the identity: a check retried after an
        // approval must re-run, while a plain retry inside the window
        // observes the first record.
        let approval_ids: Vec<&String> = ctx.approved_changes.keys().collect();
        let dedup_key = stable_json_hash_hex(&(
            "check",
            &input.target_id,
            &input.sdl,
            &input.service_name,
            context_id.as_ref().map(ContextId::as_str),
            approval_ids,
        ))
        .map_err(|e| PublisherError::internal(e.to_string()))?;
        if let Some(cached) = self.idempotency.get::<CheckResult>(&dedup_key).await {
            return Ok(cached);
        }
        let model = RegistryModel::select(
            ctx.project.project_type,
            ctx.project.legacy_registry_model,
        );
        let model_input = CheckModelInput {
            sdl: input.sdl.clone(),
            service_name: input.service_name.clone(),
            force: input.force,
            experimental_accept_breaking_changes: input.experimental_accept_breaking_changes,
        };
        let conclusion = model.check(self.services(), &ctx, &model_input).await?;

        let check = build_check_record(&ctx, &input, context_id, &conclusion);
        let check_id = check.id;
        self.run_blocking(move |storage| storage.create_schema_check(&check))
            .await?;

        let result = CheckResult {
            check_id,
            conclusion,
        };
        self.idempotency.put(&dedup_key, &result).await;
        Ok(result)
    }

    pub async fn approve_failed_schema_check(
        &self,
        check_id: SchemaCheckId,
        approved_by: String,
    ) -> Result<SchemaCheck> {
        self.run_blocking(move |storage| {
            storage.approve_failed_schema_check(&check_id, &approved_by)
        })
        .await
    }

    // ---- publish ----------------------------------------------------------

    pub async fn publish(
        &self,
        input: SchemaPublishInput,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<PublishResult> {
        let dedup_key = stable_json_hash_hex(&(
            "publish",
            &input.target_id,
            &input.service_name,
            &input.sdl,
            &input.service_url,
            &input.metadata,
            &input.author,
            &input.commit,
        ))
        .map_err(|e| PublisherError::internal(e.to_string()))?;
        if let Some(cached) = self.idempotency.get::<PublishResult>(&dedup_key).await {
            return Ok(cached);
        }

        let guard = self.lock.acquire(&input.target_id, cancel).await?;
        let result = self.publish_locked(&input, cancel).await;
        guard.release().await;

        let result = result?;
        self.idempotency.put(&dedup_key, &result).await;
        Ok(result)
    }

    async fn publish_locked(
        &self,
        input: &SchemaPublishInput,
        cancel: &watch::Receiver<bool>,
    ) -> Result<PublishResult> {
        ensure_not_cancelled(cancel)?;
        let ctx = self.load_context(&input.target_id, None).await?;
        let model = RegistryModel::select(
            ctx.project.project_type,
            ctx.project.legacy_registry_model,
        );
        let model_input = PublishModelInput {
            sdl: input.sdl.clone(),
            service_name: input.service_name.clone(),
            service_url: input.service_url.clone(),
            metadata: input.metadata.clone(),
            force: input.force,
            experimental_accept_breaking_changes: input.experimental_accept_breaking_changes,
        };
        let conclusion = model.publish(self.services(), &ctx, &model_input).await?;

        let SchemaPublishConclusion::Publish { state } = &conclusion else {
            return Ok(PublishResult {
                conclusion,
                schema_version_id: None,
            });
        };
        ensure_not_cancelled(cancel)?;

        let version = self.persist_publish(input, &ctx, state).await?;
        self.fan_out_alerts(&version, state.initial, state.changes.clone());

        Ok(PublishResult {
            conclusion,
            schema_version_id: Some(version.id),
        })
    }

    async fn persist_publish(
        &self,
        input: &SchemaPublishInput,
        ctx: &ModelContext,
        state: &SchemaPublishState,
    ) -> Result<SchemaVersion> {
        let service_name = input
            .service_name
            .clone()
            .unwrap_or_else(|| ctx.project.id.as_str().to_string());
        let metadata = input
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| PublisherError::internal(format!("metadata revalidation failed: {e}")))?;

        let create_input = CreateVersionInput {
            target_id: input.target_id.clone(),
            push: SchemaPushInput {
                service_name,
                sdl: input.sdl.clone(),
                service_url: input.service_url.clone(),
                metadata,
                author: input.author.clone(),
                commit: input.commit.clone(),
            },
            outcome: version_outcome(ctx, state),
        };

        let artifacts = Arc::clone(&self.artifacts);
        let project_type = ctx.project.project_type;
        let contract_artifacts: Vec<ContractArtifacts> =
            state.contracts.iter().map(ContractArtifacts::from).collect();
        self.run_blocking(move |storage| {
            storage.create_schema_version(create_input, move |version| {
                if version.is_composable {
                    publish_version_artifacts(
                        artifacts.as_ref(),
                        project_type,
                        version,
                        &contract_artifacts,
                    )?;
                }
                Ok(())
            })
        })
        .await
    }

    // ---- delete -----------------------------------------------------------

    pub async fn delete(
        &self,
        input: SchemaDeleteInput,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<DeleteResult> {
        let guard = self.lock.acquire(&input.target_id, cancel).await?;
        let result = self.delete_locked(&input, cancel).await;
        guard.release().await;
        result
    }

    async fn delete_locked(
        &self,
        input: &SchemaDeleteInput,
        cancel: &watch::Receiver<bool>,
    ) -> Result<DeleteResult> {
        ensure_not_cancelled(cancel)?;
        let ctx = self.load_context(&input.target_id, None).await?;
        if !ctx.project.project_type.is_composite() {
            return Err(PublisherError::validation(
                "single projects do not register named services to delete",
            ));
        }
        let model = RegistryModel::select(
            ctx.project.project_type,
            ctx.project.legacy_registry_model,
        );
        let conclusion = model
            .delete(
                self.services(),
                &ctx,
                &DeleteModelInput {
                    service_name: input.service_name.clone(),
                },
            )
            .await?;

        let SchemaDeleteConclusion::Accept { state } = &conclusion else {
            return Ok(DeleteResult {
                conclusion,
                schema_version_id: None,
            });
        };
        if input.dry_run {
            return Ok(DeleteResult {
                conclusion,
                schema_version_id: None,
            });
        }
        ensure_not_cancelled(cancel)?;

        let delete_input = DeleteVersionInput {
            target_id: input.target_id.clone(),
            service_name: input.service_name.clone(),
            author: input.author.clone(),
            outcome: VersionOutcomeInput {
                is_composable: state.composable,
                composite_schema_sdl: state.full_schema_sdl.clone(),
                supergraph_sdl: state.supergraph_sdl.clone(),
                tags: normalized_tags(&ctx, state.composable, state.tags.clone()),
                schema_composition_errors: (!state.composition_errors.is_empty())
                    .then(|| state.composition_errors.clone()),
                changes: state.changes.clone(),
                contracts: Vec::new(),
            },
        };

        let artifacts = Arc::clone(&self.artifacts);
        let project_type = ctx.project.project_type;
        let version = self
            .run_blocking(move |storage| {
                storage.delete_schema(delete_input, move |version| {
                    if version.is_composable {
                        publish_version_artifacts(
                            artifacts.as_ref(),
                            project_type,
                            version,
                            &[],
                        )?;
                    }
                    Ok(())
                })
            })
            .await?;
        self.fan_out_alerts(&version, false, state.changes.clone());

        Ok(DeleteResult {
            conclusion,
            schema_version_id: Some(version.id),
        })
    }

    // ---- admin + configuration surface ------------------------------------

    /// Flip a past version's composability. When the flipped version
    /// becomes the new latest-composable, its artifacts are republished.
    pub async fn update_version_status(
        &self,
        version_id: SchemaVersionId,
        valid: bool,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<SchemaVersion> {
        let target_id = self
            .run_blocking(move |storage| storage.get_version(&version_id))
            .await?
            .target_id;

        let guard = self.lock.acquire(&target_id, cancel).await?;
        let outcome = self.update_version_status_locked(&target_id, version_id, valid).await;
        guard.release().await;
        outcome
    }

    async fn update_version_status_locked(
        &self,
        target_id: &TargetId,
        version_id: SchemaVersionId,
        valid: bool,
    ) -> Result<SchemaVersion> {
        let (version, new_pointer) = self
            .run_blocking(move |storage| storage.update_version_status(&version_id, valid))
            .await?;

        if valid && new_pointer == Some(version.id) {
            let project = self.load_context(target_id, None).await?.project;
            let contracts = self
                .run_blocking(move |storage| storage.get_version_contracts(&version_id))
                .await?;
            let contract_artifacts: Vec<ContractArtifacts> =
                contracts.iter().map(ContractArtifacts::from).collect();
            let artifacts = Arc::clone(&self.artifacts);
            let version_for_artifacts = version.clone();
            tokio::task::spawn_blocking(move || {
                publish_version_artifacts(
                    artifacts.as_ref(),
                    project.project_type,
                    &version_for_artifacts,
                    &contract_artifacts,
                )
            })
            .await
            .map_err(|e| PublisherError::internal(format!("artifact task panicked: {e}")))?
            .map_err(PublisherError::internal)?;
        }
        Ok(version)
    }

    pub async fn create_contract(&self, contract: Contract) -> Result<()> {
        self.run_blocking(move |storage| storage.create_contract(&contract))
            .await
    }

    pub async fn disable_contract(&self, contract_id: ContractId) -> Result<()> {
        self.run_blocking(move |storage| storage.disable_contract(&contract_id))
            .await
    }

    pub async fn update_project_registry_model(
        &self,
        project_id: ProjectId,
        legacy: bool,
    ) -> Result<()> {
        self.run_blocking(move |storage| {
            storage.update_project_registry_model(&project_id, legacy)
        })
        .await
    }

    pub async fn enable_external_schema_composition(
        &self,
        project_id: ProjectId,
        config: ExternalCompositionConfig,
    ) -> Result<()> {
        self.run_blocking(move |storage| {
            storage.enable_external_schema_composition(&project_id, &config)
        })
        .await
    }

    pub async fn disable_external_schema_composition(&self, project_id: ProjectId) -> Result<()> {
        self.run_blocking(move |storage| {
            storage.disable_external_schema_composition(&project_id)
        })
        .await
    }

    pub async fn update_native_federation(
        &self,
        project_id: ProjectId,
        enabled: bool,
    ) -> Result<()> {
        self.run_blocking(move |storage| storage.update_native_federation(&project_id, enabled))
            .await
    }

    // ---- alerts -----------------------------------------------------------

    /// Fire-and-forget: alert failures are logged, never surfaced.
    fn fan_out_alerts(
        &self,
        version: &SchemaVersion,
        initial: bool,
        changes: Vec<quiver_registry_model::SchemaChange>,
    ) {
        let errors = version
            .schema_composition_errors
            .clone()
            .unwrap_or_default();
        if changes.is_empty() && errors.is_empty() {
            return;
        }
        let notification = SchemaChangeNotification {
            target_id: version.target_id.clone(),
            schema_version_id: version.id,
            initial,
            changes,
            composition_errors: errors,
        };
        let alerts = Arc::clone(&self.alerts);
        tokio::spawn(async move {
            if let Err(error) = alerts.notify_schema_change(notification).await {
                warn!("schema change notification failed: {error}");
            } else {
                info!("schema change notification delivered");
            }
        });
    }
}

fn ensure_not_cancelled(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        Err(PublisherError::Cancelled)
    } else {
        Ok(())
    }
}

/// Tags are non-null exactly when the version is composable and the
/// project supports contracts.
fn normalized_tags(
    ctx: &ModelContext,
    composable: bool,
    tags: Option<Vec<String>>,
) -> Option<Vec<String>> {
    let supports_contracts = ctx.project.project_type.supports_contracts()
        && !ctx.project.legacy_registry_model;
    (composable && supports_contracts).then(|| tags.unwrap_or_default())
}

fn version_outcome(ctx: &ModelContext, state: &SchemaPublishState) -> VersionOutcomeInput {
    VersionOutcomeInput {
        is_composable: state.composable,
        composite_schema_sdl: state.full_schema_sdl.clone(),
        supergraph_sdl: state.supergraph_sdl.clone(),
        tags: normalized_tags(ctx, state.composable, state.tags.clone()),
        schema_composition_errors: (!state.composition_errors.is_empty())
            .then(|| state.composition_errors.clone()),
        changes: state.changes.clone(),
        contracts: state
            .contracts
            .iter()
            .map(|contract| ContractVersionInput {
                contract_id: contract.contract_id,
                contract_name: contract.contract_name.clone(),
                is_composable: contract.is_composable,
                composite_schema_sdl: contract.composite_schema_sdl.clone(),
                supergraph_sdl: contract.supergraph_sdl.clone(),
                schema_composition_errors: (!contract.composition_errors.is_empty())
                    .then(|| contract.composition_errors.clone()),
                changes: contract.changes.clone(),
            })
            .collect(),
    }
}

fn resolve_context_id(
    explicit: Option<&str>,
    github: Option<&GitHubIntegrationMetadata>,
) -> Result<Option<ContextId>> {
    if let Some(explicit) = explicit {
        return ContextId::new(explicit)
            .map(Some)
            .map_err(|e| PublisherError::validation(e.to_string()));
    }
    if let Some(github) = github {
        if let Some(pr) = github.pull_request_number {
            return ContextId::new(format!("{}#{pr}", github.repository))
                .map(Some)
                .map_err(|e| PublisherError::validation(e.to_string()));
        }
    }
    Ok(None)
}

fn build_check_record(
    ctx: &ModelContext,
    input: &SchemaCheckInput,
    context_id: Option<ContextId>,
    conclusion: &SchemaCheckConclusion,
) -> SchemaCheck {
    let now = Utc::now();
    let expires_at =
        now + ChronoDuration::days(i64::from(ctx.organization.check_retention_days));
    let baseline = ctx.baseline_version().map(|v| v.id);

    let mut check = SchemaCheck {
        id: SchemaCheckId::generate(),
        target_id: input.target_id.clone(),
        schema_sdl: input.sdl.clone(),
        service_name: input.service_name.clone(),
        schema_version_id: baseline,
        is_success: conclusion.is_success(),
        breaking_schema_changes: Vec::new(),
        safe_schema_changes: Vec::new(),
        schema_policy_warnings: Vec::new(),
        schema_policy_errors: Vec::new(),
        composition_errors: Vec::new(),
        composite_schema_sdl: None,
        supergraph_sdl: None,
        contract_checks: Vec::new(),
        context_id,
        github: input.github.clone(),
        is_manually_approved: false,
        manual_approver: None,
        created_at: now,
        expires_at,
    };

    match conclusion {
        SchemaCheckConclusion::Success { state: None } => {}
        SchemaCheckConclusion::Success { state: Some(state) } => {
            let (breaking, safe): (Vec<_>, Vec<_>) = state
                .schema_changes
                .iter()
                .cloned()
                .partition(|c| c.severity == ChangeSeverity::Breaking);
            check.breaking_schema_changes = breaking;
            check.safe_schema_changes = safe;
            check.schema_policy_warnings = state.schema_policy_warnings.clone();
            check.contract_checks = state.contract_checks.clone();
            if let Some(composition) = &state.composition {
                check.composite_schema_sdl = Some(composition.composite_schema_sdl.clone());
                check.supergraph_sdl = composition.supergraph_sdl.clone();
            }
        }
        SchemaCheckConclusion::Failure { state } => {
            check.breaking_schema_changes = state.breaking_changes.clone();
            check.safe_schema_changes = state.safe_changes.clone();
            check.schema_policy_warnings = state.schema_policy_warnings.clone();
            check.schema_policy_errors = state.schema_policy_errors.clone();
            check.composition_errors = state.composition_errors.clone();
            check.composite_schema_sdl = state.composite_schema_sdl.clone();
            check.supergraph_sdl = state.supergraph_sdl.clone();
            check.contract_checks = state.contract_checks.clone();
        }
        _ => {}
    }

    check
}

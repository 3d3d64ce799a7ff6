use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quiver_registry_compose::{
    CompositionOptions, CompositionOutcome, NativeComposer, Orchestrator, OrchestratorError,
};
use quiver_registry_inspect::NoUsageOracle;
use quiver_registry_model::{
    ChangeSeverity, CompositionError, Contract, ContractId, Organization, OrganizationId,
    Project, ProjectId, ProjectType, PublishIgnoreReason, PublishRejectReason,
    SchemaChangeType, SchemaCheckConclusion, SchemaPublishConclusion, ServiceSchema, Target,
    TargetId,
};
use quiver_registry_policies::NoopPolicyEngine;
use quiver_registry_publisher::{
    cancellation, MemoryIdempotencyBackend, MemoryLockBackend, NoopAlerts, PublisherDeps,
    RegistryConfig, SchemaCheckInput, SchemaPublishInput, SchemaPublisher,
};
use quiver_registry_store::{ArtifactStoreBackend, MemoryArtifactStore, SqliteStorage};

struct Harness {
    publisher: SchemaPublisher,
    storage: Arc<SqliteStorage>,
    artifacts: Arc<MemoryArtifactStore>,
    target: TargetId,
    project: ProjectId,
}

fn harness_with(project_type: ProjectType, orchestrator: Arc<dyn Orchestrator>) -> Harness {
    let storage = Arc::new(SqliteStorage::in_memory().expect("storage"));
    let org = Organization::new(OrganizationId::new("acme").expect("org"), 30);
    let project = Project::new(
        ProjectId::new("platform").expect("project"),
        org.id.clone(),
        project_type,
    );
    let target = Target::new(
        TargetId::new("staging").expect("target"),
        project.id.clone(),
        org.id.clone(),
    );
    storage.upsert_organization(&org).expect("org");
    storage.upsert_project(&project).expect("project");
    storage.upsert_target(&target).expect("target");

    let artifacts = Arc::new(MemoryArtifactStore::new());
    let publisher = SchemaPublisher::new(
        PublisherDeps {
            storage: Arc::clone(&storage),
            artifacts: Arc::clone(&artifacts) as Arc<dyn ArtifactStoreBackend>,
            orchestrator,
            policy: Arc::new(NoopPolicyEngine),
            usage: Arc::new(NoUsageOracle),
            alerts: Arc::new(NoopAlerts),
            lock_backend: Arc::new(MemoryLockBackend::new()),
            idempotency_backend: Arc::new(MemoryIdempotencyBackend::new()),
        },
        RegistryConfig::default(),
    );
    Harness {
        publisher,
        storage,
        artifacts,
        target: target.id,
        project: project.id,
    }
}

fn harness(project_type: ProjectType) -> Harness {
    harness_with(project_type, Arc::new(NativeComposer::new()))
}

fn publish_input(harness: &Harness, service: &str, sdl: &str, url: &str) -> SchemaPublishInput {
    SchemaPublishInput {
        target_id: harness.target.clone(),
        sdl: sdl.to_string(),
        service_name: Some(service.to_string()),
        service_url: Some(url.to_string()),
        metadata: None,
        author: "ci".to_string(),
        commit: "0a1b2c3".to_string(),
        force: false,
        experimental_accept_breaking_changes: false,
    }
}

fn check_input(harness: &Harness, sdl: &str, context: Option<&str>) -> SchemaCheckInput {
    SchemaCheckInput {
        target_id: harness.target.clone(),
        sdl: sdl.to_string(),
        service_name: None,
        context_id: context.map(str::to_string),
        github: None,
        force: false,
        experimental_accept_breaking_changes: false,
    }
}

#[tokio::test]
async fn initial_composite_publish_creates_a_composable_version() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let result = harness
        .publisher
        .publish(
            publish_input(&harness, "users", "type Query { me: String }", "https://u"),
            &mut cancel,
        )
        .await
        .expect("publish");

    let SchemaPublishConclusion::Publish { state } = &result.conclusion else {
        panic!("expected publish, got {:?}", result.conclusion);
    };
    assert!(state.initial);
    assert!(state.composable);
    assert!(state.changes.is_empty());

    let version = harness
        .storage
        .get_maybe_latest_version(&harness.target)
        .expect("latest")
        .expect("version");
    assert_eq!(version.tags.as_deref(), Some(&[][..]));
    assert_eq!(result.schema_version_id, Some(version.id));

    let services = harness
        .artifacts
        .get(&quiver_registry_store::ArtifactKey::target(
            harness.target.clone(),
            quiver_registry_store::ArtifactKind::Services,
        ))
        .expect("artifact read")
        .expect("services artifact");
    let entries: Vec<serde_json::Value> = serde_json::from_slice(&services).expect("json");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "users");
    assert_eq!(entries[0]["url"], "https://u");
}

#[tokio::test]
async fn breaking_check_fails_and_records_an_expiring_check() {
    let harness = harness(ProjectType::Single);
    let (_tx, mut cancel) = cancellation();

    let mut baseline = publish_input(&harness, "platform", "type Query { name: String! }", "https://p");
    baseline.service_name = None;
    baseline.service_url = None;
    harness
        .publisher
        .publish(baseline, &mut cancel)
        .await
        .expect("baseline publish");

    let result = harness
        .publisher
        .check(check_input(&harness, "type Query { name: Int! }", None))
        .await
        .expect("check");

    let SchemaCheckConclusion::Failure { state } = &result.conclusion else {
        panic!("expected failure, got {:?}", result.conclusion);
    };
    assert_eq!(state.breaking_changes.len(), 1);
    assert_eq!(
        state.breaking_changes[0].change_type,
        SchemaChangeType::FieldTypeChanged
    );

    let record = harness
        .storage
        .get_schema_check(&result.check_id)
        .expect("check record");
    assert!(!record.is_success);
    assert!(record.expires_at > Utc::now());
}

#[tokio::test]
async fn approved_breaking_change_passes_the_next_check_with_the_approver() {
    let harness = harness(ProjectType::Single);
    let (_tx, mut cancel) = cancellation();

    let mut baseline = publish_input(&harness, "platform", "type Query { name: String! }", "https://p");
    baseline.service_name = None;
    baseline.service_url = None;
    harness
        .publisher
        .publish(baseline, &mut cancel)
        .await
        .expect("baseline publish");

    let failing = harness
        .publisher
        .check(check_input(&harness, "type Query { name: Int! }", Some("repo#42")))
        .await
        .expect("check");
    assert!(!failing.conclusion.is_success());

    harness
        .publisher
        .approve_failed_schema_check(failing.check_id, "reviewer".to_string())
        .await
        .expect("approve");

    let retried = harness
        .publisher
        .check(check_input(&harness, "type Query { name: Int! }", Some("repo#42")))
        .await
        .expect("re-check");
    let SchemaCheckConclusion::Success { state: Some(state) } = &retried.conclusion else {
        panic!("expected success, got {:?}", retried.conclusion);
    };
    let breaking: Vec<_> = state
        .schema_changes
        .iter()
        .filter(|c| c.severity == ChangeSeverity::Breaking)
        .collect();
    assert_eq!(breaking.len(), 1);
    assert_eq!(
        breaking[0].approval.as_ref().expect("approval").approved_by,
        "reviewer"
    );
}

#[tokio::test]
async fn url_change_alone_publishes_with_a_registry_url_change() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let sdl = "type Query { me: String }";
    harness
        .publisher
        .publish(publish_input(&harness, "users", sdl, "https://a"), &mut cancel)
        .await
        .expect("first publish");

    let result = harness
        .publisher
        .publish(publish_input(&harness, "users", sdl, "https://b"), &mut cancel)
        .await
        .expect("second publish");

    let SchemaPublishConclusion::Publish { state } = &result.conclusion else {
        panic!("expected publish, got {:?}", result.conclusion);
    };
    assert!(state.composable);
    let url_changes: Vec<_> = state
        .changes
        .iter()
        .filter(|c| c.change_type == SchemaChangeType::RegistryServiceUrlChanged)
        .collect();
    assert_eq!(url_changes.len(), 1);
    assert_eq!(
        url_changes[0].meta.get("old").map(String::as_str),
        Some("https://a")
    );
    assert_eq!(
        url_changes[0].meta.get("new").map(String::as_str),
        Some("https://b")
    );
}

/// Composition backend that answers errors and a document at once, the way
/// old federation backends do.
struct ErrorsWithSdlComposer;

#[async_trait]
impl Orchestrator for ErrorsWithSdlComposer {
    async fn compose_and_validate(
        &self,
        _project_type: ProjectType,
        _schemas: &[ServiceSchema],
        _options: &CompositionOptions,
    ) -> Result<CompositionOutcome, OrchestratorError> {
        Ok(CompositionOutcome {
            sdl: Some("type Query { me: String }".to_string()),
            supergraph: None,
            tags: Some(vec![]),
            errors: vec![CompositionError::composition("fields conflict")],
            contracts: None,
        })
    }
}

#[tokio::test]
async fn errors_with_sdl_reject_against_latest_but_publish_against_composable_baseline() {
    let rejecting = harness_with(ProjectType::Federation, Arc::new(ErrorsWithSdlComposer));
    let (_tx, mut cancel) = cancellation();
    let result = rejecting
        .publisher
        .publish(
            publish_input(&rejecting, "users", "type Query { me: String }", "https://u"),
            &mut cancel,
        )
        .await
        .expect("publish");
    assert!(matches!(
        result.conclusion,
        SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::CompositionFailure { .. }
        }
    ));
    assert!(result.schema_version_id.is_none());

    let accepting = harness_with(ProjectType::Federation, Arc::new(ErrorsWithSdlComposer));
    let mut project = Project::new(
        accepting.project.clone(),
        OrganizationId::new("acme").expect("org"),
        ProjectType::Federation,
    );
    project.compare_to_previous_composable_version = true;
    accepting.storage.upsert_project(&project).expect("project");

    let result = accepting
        .publisher
        .publish(
            publish_input(&accepting, "users", "type Query { me: String }", "https://u"),
            &mut cancel,
        )
        .await
        .expect("publish");
    let SchemaPublishConclusion::Publish { state } = &result.conclusion else {
        panic!("expected publish, got {:?}", result.conclusion);
    };
    assert!(!state.composable);
    assert_eq!(state.full_schema_sdl.as_deref(), Some("type Query { me: String }"));

    let version = accepting
        .storage
        .get_maybe_latest_version(&accepting.target)
        .expect("latest")
        .expect("version");
    assert!(!version.is_composable);
    assert!(version.composite_schema_sdl.is_some());
    assert!(version
        .schema_composition_errors
        .as_ref()
        .is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn contract_failures_are_isolated_per_contract() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let baseline_sdl = r#"
        type Query {
            alphaField: String @tag(name: "alpha")
            betaField: String @tag(name: "beta")
            shared: String @tag(name: "alpha") @tag(name: "beta")
        }
    "#;
    harness
        .publisher
        .create_contract(Contract {
            id: ContractId::generate(),
            target_id: harness.target.clone(),
            contract_name: "alpha".to_string(),
            include_tags: vec!["alpha".to_string()],
            exclude_tags: vec![],
            remove_unreachable_types_from_public_api_schema: false,
            is_disabled: false,
            created_at: Utc::now(),
        })
        .await
        .expect("contract alpha");
    harness
        .publisher
        .create_contract(Contract {
            id: ContractId::generate(),
            target_id: harness.target.clone(),
            contract_name: "beta".to_string(),
            include_tags: vec!["beta".to_string()],
            exclude_tags: vec![],
            remove_unreachable_types_from_public_api_schema: false,
            is_disabled: false,
            created_at: Utc::now(),
        })
        .await
        .expect("contract beta");

    harness
        .publisher
        .publish(
            publish_input(&harness, "users", baseline_sdl, "https://u"),
            &mut cancel,
        )
        .await
        .expect("baseline publish");

    // alphaField disappears: breaking for the alpha contract only.
    let incoming = r#"
        type Query {
            betaField: String @tag(name: "beta")
            shared: String @tag(name: "alpha") @tag(name: "beta")
        }
    "#;
    let mut input = check_input(&harness, incoming, None);
    input.service_name = Some("users".to_string());
    let result = harness.publisher.check(input).await.expect("check");

    let SchemaCheckConclusion::Failure { state } = &result.conclusion else {
        panic!("expected failure, got {:?}", result.conclusion);
    };
    let alpha = state
        .contract_checks
        .iter()
        .find(|c| c.contract_name == "alpha")
        .expect("alpha result");
    let beta = state
        .contract_checks
        .iter()
        .find(|c| c.contract_name == "beta")
        .expect("beta result");
    assert!(!alpha.is_successful);
    assert!(!alpha.breaking_changes.is_empty());
    assert!(beta.is_successful);
    assert!(beta.breaking_changes.is_empty());
}

#[tokio::test]
async fn republishing_the_same_schema_is_ignored() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let sdl = "type Query { me: String }";
    let first = harness
        .publisher
        .publish(publish_input(&harness, "users", sdl, "https://u"), &mut cancel)
        .await
        .expect("first publish");
    assert!(first.schema_version_id.is_some());

    // A new commit with an identical document: not deduplicated, ignored.
    let mut again = publish_input(&harness, "users", sdl, "https://u");
    again.commit = "4d5e6f7".to_string();
    let second = harness
        .publisher
        .publish(again, &mut cancel)
        .await
        .expect("second publish");
    assert!(matches!(
        second.conclusion,
        SchemaPublishConclusion::Ignore {
            reason: PublishIgnoreReason::NoChanges
        }
    ));
    assert!(second.schema_version_id.is_none());

    let latest = harness
        .storage
        .get_maybe_latest_version(&harness.target)
        .expect("latest")
        .expect("version");
    assert_eq!(Some(latest.id), first.schema_version_id);
}

#[tokio::test]
async fn identical_publish_inside_the_window_observes_the_first_result() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let input = publish_input(&harness, "users", "type Query { me: String }", "https://u");
    let first = harness
        .publisher
        .publish(input.clone(), &mut cancel)
        .await
        .expect("first publish");
    let second = harness
        .publisher
        .publish(input, &mut cancel)
        .await
        .expect("second publish");

    assert!(first.schema_version_id.is_some());
    assert_eq!(first.schema_version_id, second.schema_version_id);
    assert!(matches!(
        second.conclusion,
        SchemaPublishConclusion::Publish { .. }
    ));
}

#[tokio::test]
async fn delete_then_publish_restores_the_service() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let sdl = "type Query { me: String }";
    harness
        .publisher
        .publish(publish_input(&harness, "users", sdl, "https://u"), &mut cancel)
        .await
        .expect("publish");
    harness
        .publisher
        .publish(
            publish_input(&harness, "reviews", "type Review { body: String }", "https://r"),
            &mut cancel,
        )
        .await
        .expect("publish reviews");

    let deleted = harness
        .publisher
        .delete(
            quiver_registry_publisher::SchemaDeleteInput {
                target_id: harness.target.clone(),
                service_name: "users".to_string(),
                author: None,
                dry_run: false,
            },
            &mut cancel,
        )
        .await
        .expect("delete");
    assert!(deleted.schema_version_id.is_some());

    let after_delete = harness
        .storage
        .get_latest_schemas(&harness.target, false)
        .expect("schemas");
    assert_eq!(after_delete.len(), 1);
    assert_eq!(after_delete[0].service_name, "reviews");

    harness
        .publisher
        .publish(publish_input(&harness, "users", sdl, "https://u"), &mut cancel)
        .await
        .expect("republish");
    let restored = harness
        .storage
        .get_latest_schemas(&harness.target, false)
        .expect("schemas");
    assert_eq!(restored.len(), 2);
    let users = restored
        .iter()
        .find(|s| s.service_name == "users")
        .expect("users");
    assert_eq!(users.sdl, sdl);
}

#[tokio::test]
async fn dry_run_delete_persists_nothing() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    harness
        .publisher
        .publish(
            publish_input(&harness, "users", "type Query { me: String }", "https://u"),
            &mut cancel,
        )
        .await
        .expect("publish");

    let result = harness
        .publisher
        .delete(
            quiver_registry_publisher::SchemaDeleteInput {
                target_id: harness.target.clone(),
                service_name: "users".to_string(),
                author: None,
                dry_run: true,
            },
            &mut cancel,
        )
        .await
        .expect("dry run");
    assert!(result.schema_version_id.is_none());
    assert_eq!(
        harness
            .storage
            .get_latest_schemas(&harness.target, false)
            .expect("schemas")
            .len(),
        1
    );
}

#[tokio::test]
async fn missing_service_name_rejects_a_composite_publish() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let mut input = publish_input(&harness, "users", "type Query { me: String }", "https://u");
    input.service_name = None;
    let result = harness
        .publisher
        .publish(input, &mut cancel)
        .await
        .expect("publish");
    assert!(matches!(
        result.conclusion,
        SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::MissingServiceName
        }
    ));

    let mut input = publish_input(&harness, "users", "type Query { me: String }", "https://u");
    input.service_url = Some("not a url".to_string());
    let result = harness
        .publisher
        .publish(input, &mut cancel)
        .await
        .expect("publish");
    assert!(matches!(
        result.conclusion,
        SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::InvalidServiceUrl { .. }
        }
    ));
}

#[tokio::test]
async fn malformed_metadata_rejects_the_publish() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let mut input = publish_input(&harness, "users", "type Query { me: String }", "https://u");
    input.metadata = Some("{not json".to_string());
    let result = harness
        .publisher
        .publish(input, &mut cancel)
        .await
        .expect("publish");
    assert!(matches!(
        result.conclusion,
        SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::MetadataParsingFailure { .. }
        }
    ));
}

#[tokio::test]
async fn legacy_publish_blocks_breaking_changes_unless_forced() {
    let harness = harness(ProjectType::Single);
    let (_tx, mut cancel) = cancellation();

    let mut project = Project::new(
        harness.project.clone(),
        OrganizationId::new("acme").expect("org"),
        ProjectType::Single,
    );
    project.legacy_registry_model = true;
    harness.storage.upsert_project(&project).expect("project");

    let mut baseline = publish_input(&harness, "platform", "type Query { name: String! }", "https://p");
    baseline.service_name = None;
    baseline.service_url = None;
    harness
        .publisher
        .publish(baseline, &mut cancel)
        .await
        .expect("baseline");

    let mut breaking = publish_input(&harness, "platform", "type Query { name: Int! }", "https://p");
    breaking.service_name = None;
    breaking.service_url = None;
    let rejected = harness
        .publisher
        .publish(breaking.clone(), &mut cancel)
        .await
        .expect("publish");
    assert!(matches!(
        rejected.conclusion,
        SchemaPublishConclusion::Reject {
            reason: PublishRejectReason::BreakingChanges { .. }
        }
    ));

    breaking.force = true;
    breaking.commit = "f0rced1".to_string();
    let forced = harness
        .publisher
        .publish(breaking, &mut cancel)
        .await
        .expect("forced publish");
    assert!(matches!(
        forced.conclusion,
        SchemaPublishConclusion::Publish { .. }
    ));
    assert!(forced.schema_version_id.is_some());
}

#[tokio::test]
async fn policy_errors_fail_a_modern_check_but_not_a_legacy_one() {
    use quiver_registry_policies::RulePolicyEngine;

    let storage = Arc::new(SqliteStorage::in_memory().expect("storage"));
    let org = Organization::new(OrganizationId::new("acme").expect("org"), 30);
    let mut project = Project::new(
        ProjectId::new("platform").expect("project"),
        org.id.clone(),
        ProjectType::Single,
    );
    let target = Target::new(
        TargetId::new("staging").expect("target"),
        project.id.clone(),
        org.id.clone(),
    );
    storage.upsert_organization(&org).expect("org");
    storage.upsert_project(&project).expect("project");
    storage.upsert_target(&target).expect("target");

    let publisher = SchemaPublisher::new(
        PublisherDeps {
            storage: Arc::clone(&storage),
            artifacts: Arc::new(MemoryArtifactStore::new()),
            orchestrator: Arc::new(NativeComposer::new()),
            policy: Arc::new(RulePolicyEngine::new()),
            usage: Arc::new(NoUsageOracle),
            alerts: Arc::new(NoopAlerts),
            lock_backend: Arc::new(MemoryLockBackend::new()),
            idempotency_backend: Arc::new(MemoryIdempotencyBackend::new()),
        },
        RegistryConfig::default(),
    );

    let bad_naming = SchemaCheckInput {
        target_id: target.id.clone(),
        sdl: "type query_root { Me: String }".to_string(),
        service_name: None,
        context_id: None,
        github: None,
        force: false,
        experimental_accept_breaking_changes: false,
    };
    let modern = publisher.check(bad_naming.clone()).await.expect("check");
    let SchemaCheckConclusion::Failure { state } = &modern.conclusion else {
        panic!("expected failure, got {:?}", modern.conclusion);
    };
    assert!(!state.schema_policy_errors.is_empty());

    project.legacy_registry_model = true;
    storage.upsert_project(&project).expect("project");
    let legacy = publisher.check(bad_naming).await.expect("legacy check");
    assert!(legacy.conclusion.is_success());
}

#[tokio::test]
async fn revalidating_an_old_version_republishes_its_artifacts() {
    let harness = harness(ProjectType::Federation);
    let (_tx, mut cancel) = cancellation();

    let first = harness
        .publisher
        .publish(
            publish_input(&harness, "users", "type Query { a: Int }", "https://u"),
            &mut cancel,
        )
        .await
        .expect("first publish");
    let mut second_input = publish_input(&harness, "users", "type Query { a: Int b: Int }", "https://u");
    second_input.commit = "1b2c3d4".to_string();
    let second = harness
        .publisher
        .publish(second_input, &mut cancel)
        .await
        .expect("second publish");
    let second_id = second.schema_version_id.expect("second version");

    // Retire the head version; the pointer falls back to the first one.
    harness
        .publisher
        .update_version_status(second_id, false, &mut cancel)
        .await
        .expect("invalidate");
    let latest_valid = harness
        .storage
        .get_maybe_latest_valid_version(&harness.target)
        .expect("latest valid")
        .expect("version");
    assert_eq!(Some(latest_valid.id), first.schema_version_id);

    // Reinstate it; it becomes latest-composable again and the CDN sdl
    // artifact reflects it.
    harness
        .publisher
        .update_version_status(second_id, true, &mut cancel)
        .await
        .expect("revalidate");
    let sdl_artifact = harness
        .artifacts
        .get(&quiver_registry_store::ArtifactKey::target(
            harness.target.clone(),
            quiver_registry_store::ArtifactKind::Sdl,
        ))
        .expect("artifact read")
        .expect("sdl artifact");
    let sdl = String::from_utf8(sdl_artifact).expect("utf8");
    assert!(sdl.contains("b: Int"));
}

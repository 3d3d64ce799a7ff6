use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use quiver_registry_model::{
    ChangeSeverity, ContextId, Organization, OrganizationId, Project, ProjectId, ProjectType,
    SchemaChange, SchemaChangeType, SchemaCheck, SchemaCheckId, Target, TargetId,
};
use quiver_registry_store::{
    CreateVersionInput, DeleteVersionInput, SchemaPushInput, SqliteStorage, StorageError,
    VersionOutcomeInput,
};

fn seeded_storage() -> (SqliteStorage, TargetId) {
    let storage = SqliteStorage::in_memory().expect("in-memory storage");
    let org = Organization::new(OrganizationId::new("acme").expect("org id"), 30);
    let project = Project::new(
        ProjectId::new("platform").expect("project id"),
        org.id.clone(),
        ProjectType::Federation,
    );
    let target = Target::new(
        TargetId::new("staging").expect("target id"),
        project.id.clone(),
        org.id.clone(),
    );
    storage.upsert_organization(&org).expect("org");
    storage.upsert_project(&project).expect("project");
    storage.upsert_target(&target).expect("target");
    (storage, target.id)
}

fn push_input(target: &TargetId, service: &str, sdl: &str, url: Option<&str>) -> CreateVersionInput {
    CreateVersionInput {
        target_id: target.clone(),
        push: SchemaPushInput {
            service_name: service.to_string(),
            sdl: sdl.to_string(),
            service_url: url.map(str::to_string),
            metadata: None,
            author: "ci".to_string(),
            commit: "0a1b2c3".to_string(),
        },
        outcome: VersionOutcomeInput {
            is_composable: true,
            composite_schema_sdl: Some(sdl.to_string()),
            supergraph_sdl: None,
            tags: None,
            schema_composition_errors: None,
            changes: Vec::new(),
            contracts: Vec::new(),
        },
    }
}

#[test]
fn publish_swaps_the_active_log_set() {
    let (storage, target) = seeded_storage();

    storage
        .create_schema_version(
            push_input(&target, "users", "type Query { me: String }", Some("https://u")),
            |_| Ok(()),
        )
        .expect("first publish");
    storage
        .create_schema_version(
            push_input(&target, "reviews", "type Review { body: String }", Some("https://r")),
            |_| Ok(()),
        )
        .expect("second publish");
    let replaced = storage
        .create_schema_version(
            push_input(&target, "users", "type Query { me: ID }", Some("https://u")),
            |_| Ok(()),
        )
        .expect("third publish");

    let names: Vec<&str> = replaced
        .schemas
        .iter()
        .map(|s| s.service_name.as_str())
        .collect();
    assert_eq!(names, vec!["reviews", "users"]);
    let users = replaced
        .schemas
        .iter()
        .find(|s| s.service_name == "users")
        .expect("users entry");
    assert_eq!(users.sdl, "type Query { me: ID }");
}

#[test]
fn version_lineage_and_pointers_advance() {
    let (storage, target) = seeded_storage();

    let first = storage
        .create_schema_version(push_input(&target, "users", "type Query { a: Int }", None), |_| {
            Ok(())
        })
        .expect("first");
    assert!(first.previous_schema_version_id.is_none());

    let mut broken = push_input(&target, "users", "type Query { a: Int b: Int }", None);
    broken.outcome.is_composable = false;
    broken.outcome.composite_schema_sdl = None;
    broken.outcome.schema_composition_errors = Some(vec![
        quiver_registry_model::CompositionError::composition("conflict"),
    ]);
    let second = storage
        .create_schema_version(broken, |_| Ok(()))
        .expect("second");
    assert_eq!(second.previous_schema_version_id, Some(first.id));

    let latest = storage
        .get_maybe_latest_version(&target)
        .expect("latest")
        .expect("some");
    assert_eq!(latest.id, second.id);

    let latest_valid = storage
        .get_maybe_latest_valid_version(&target)
        .expect("latest valid")
        .expect("some");
    assert_eq!(latest_valid.id, first.id);
}

#[test]
fn failing_action_hook_rolls_the_version_back() {
    let (storage, target) = seeded_storage();

    let result = storage.create_schema_version(
        push_input(&target, "users", "type Query { me: String }", None),
        |_| Err("artifact store rejected the write".to_string()),
    );
    assert!(matches!(result, Err(StorageError::ActionFailed { .. })));

    assert!(storage
        .get_maybe_latest_version(&target)
        .expect("latest")
        .is_none());
    assert!(storage
        .get_latest_schemas(&target, false)
        .expect("schemas")
        .is_empty());
}

#[test]
fn delete_then_push_restores_the_service() {
    let (storage, target) = seeded_storage();
    let sdl = "type Query { me: String }";

    storage
        .create_schema_version(push_input(&target, "users", sdl, Some("https://u")), |_| Ok(()))
        .expect("publish");
    storage
        .delete_schema(
            DeleteVersionInput {
                target_id: target.clone(),
                service_name: "users".to_string(),
                author: None,
                outcome: VersionOutcomeInput {
                    is_composable: true,
                    composite_schema_sdl: Some(String::new()),
                    ..VersionOutcomeInput::default()
                },
            },
            |_| Ok(()),
        )
        .expect("delete");

    assert!(storage
        .get_latest_schemas(&target, false)
        .expect("schemas")
        .is_empty());

    let restored = storage
        .create_schema_version(push_input(&target, "users", sdl, Some("https://u")), |_| Ok(()))
        .expect("republish");
    assert_eq!(restored.schemas.len(), 1);
    assert_eq!(restored.schemas[0].sdl, sdl);
}

#[test]
fn update_version_status_moves_the_composable_pointer() {
    let (storage, target) = seeded_storage();

    let first = storage
        .create_schema_version(push_input(&target, "users", "type Query { a: Int }", None), |_| {
            Ok(())
        })
        .expect("first");
    let second = storage
        .create_schema_version(push_input(&target, "users", "type Query { b: Int }", None), |_| {
            Ok(())
        })
        .expect("second");

    let (_, pointer) = storage
        .update_version_status(&second.id, false)
        .expect("flip invalid");
    assert_eq!(pointer, Some(first.id));

    let (refreshed, pointer) = storage
        .update_version_status(&second.id, true)
        .expect("flip valid");
    assert!(refreshed.is_composable);
    assert_eq!(pointer, Some(second.id));
}

fn check_row(target: &TargetId, context: Option<&str>, expires_in: Duration) -> SchemaCheck {
    let now = Utc::now();
    SchemaCheck {
        id: SchemaCheckId::generate(),
        target_id: target.clone(),
        schema_sdl: "type Query { name: Int! }".to_string(),
        service_name: None,
        schema_version_id: None,
        is_success: false,
        breaking_schema_changes: vec![SchemaChange {
            id: "change-1".to_string(),
            change_type: SchemaChangeType::FieldTypeChanged,
            severity: ChangeSeverity::Breaking,
            message: "Field `Query.name` changed type from `String!` to `Int!`".to_string(),
            path: Some("Query.name".to_string()),
            meta: BTreeMap::new(),
            is_safe_based_on_usage: false,
            approval: None,
        }],
        safe_schema_changes: Vec::new(),
        schema_policy_warnings: Vec::new(),
        schema_policy_errors: Vec::new(),
        composition_errors: Vec::new(),
        composite_schema_sdl: None,
        supergraph_sdl: None,
        contract_checks: Vec::new(),
        context_id: context.map(|c| ContextId::new(c).expect("context id")),
        github: None,
        is_manually_approved: false,
        manual_approver: None,
        created_at: now,
        expires_at: now + expires_in,
    }
}

#[test]
fn approving_a_failed_check_creates_scoped_approvals() {
    let (storage, target) = seeded_storage();
    let check = check_row(&target, Some("repo#42"), Duration::days(7));
    storage.create_schema_check(&check).expect("check");

    let approved = storage
        .approve_failed_schema_check(&check.id, "reviewer")
        .expect("approve");
    assert!(approved.is_manually_approved);
    assert_eq!(approved.manual_approver.as_deref(), Some("reviewer"));

    let approvals = storage
        .get_approved_schema_changes_for_context_id(
            &target,
            &ContextId::new("repo#42").expect("context id"),
        )
        .expect("approvals");
    let approval = approvals.get("change-1").expect("approval for change");
    assert_eq!(approval.approved_by, "reviewer");
    assert_eq!(
        approval
            .change
            .approval
            .as_ref()
            .expect("approval metadata")
            .approved_by,
        "reviewer"
    );
}

#[test]
fn approving_requires_failure_and_context() {
    let (storage, target) = seeded_storage();

    let mut passing = check_row(&target, Some("repo#42"), Duration::days(7));
    passing.is_success = true;
    storage.create_schema_check(&passing).expect("check");
    assert!(storage
        .approve_failed_schema_check(&passing.id, "reviewer")
        .is_err());

    let contextless = check_row(&target, None, Duration::days(7));
    storage.create_schema_check(&contextless).expect("check");
    assert!(storage
        .approve_failed_schema_check(&contextless.id, "reviewer")
        .is_err());
}

#[test]
fn purge_removes_exactly_the_expired_checks_and_keeps_approvals() {
    let (storage, target) = seeded_storage();

    let expired = check_row(&target, Some("repo#42"), Duration::seconds(-5));
    let live = check_row(&target, Some("repo#43"), Duration::days(7));
    storage.create_schema_check(&expired).expect("expired");
    storage.create_schema_check(&live).expect("live");
    storage
        .approve_failed_schema_check(&expired.id, "reviewer")
        .expect("approve");

    let deleted = storage
        .purge_expired_schema_checks(Utc::now())
        .expect("purge");
    assert_eq!(deleted, 1);

    assert!(storage.get_schema_check(&expired.id).is_err());
    assert!(storage.get_schema_check(&live.id).is_ok());

    let approvals = storage
        .get_approved_schema_changes_for_context_id(
            &target,
            &ContextId::new("repo#42").expect("context id"),
        )
        .expect("approvals");
    assert_eq!(approvals.len(), 1);
}

#[test]
fn check_rows_round_trip_through_the_sdl_store() {
    let (storage, target) = seeded_storage();
    let check = check_row(&target, Some("repo#42"), Duration::days(7));
    storage.create_schema_check(&check).expect("create");
    let loaded = storage.get_schema_check(&check.id).expect("load");
    assert_eq!(loaded.schema_sdl, check.schema_sdl);
    assert_eq!(loaded.breaking_schema_changes, check.breaking_schema_changes);
    assert_eq!(loaded.context_id, check.context_id);
    assert_eq!(loaded.expires_at.timestamp(), check.expires_at.timestamp());
}

// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use quiver_registry_core::sha256_hex;
use quiver_registry_model::{
    swap_services, ChangeApprovalMetadata, CompositionError, ContextId, Contract, ContractId,
    ContractVersionId, DeletedSchema, ExternalCompositionConfig, GitHubIntegrationMetadata,
    Organization, OrganizationId, Project, ProjectId, ProjectType, PushedSchema, SchemaChange,
    SchemaChangeApproval, SchemaCheck, SchemaCheckId, SchemaLogEntry, SchemaLogId, SchemaVersion,
    SchemaVersionContract, SchemaVersionId, Target, TargetId,
};

use crate::error::{Result, StorageError};
use crate::schema::DDL;

/// What a model run settled on for the version being written. Shared by
/// publish and delete.
#[derive(Debug, Clone, Default)]
pub struct VersionOutcomeInput {
    pub is_composable: bool,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
    pub schema_composition_errors: Option<Vec<CompositionError>>,
    pub changes: Vec<SchemaChange>,
    pub contracts: Vec<ContractVersionInput>,
}

#[derive(Debug, Clone)]
pub struct ContractVersionInput {
    pub contract_id: ContractId,
    pub contract_name: String,
    pub is_composable: bool,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub schema_composition_errors: Option<Vec<CompositionError>>,
    pub changes: Vec<SchemaChange>,
}

#[derive(Debug, Clone)]
pub struct SchemaPushInput {
    pub service_name: String,
    pub sdl: String,
    pub service_url: Option<String>,
    pub metadata: Option<Value>,
    pub author: String,
    pub commit: String,
}

#[derive(Debug, Clone)]
pub struct CreateVersionInput {
    pub target_id: TargetId,
    pub push: SchemaPushInput,
    pub outcome: VersionOutcomeInput,
}

#[derive(Debug, Clone)]
pub struct DeleteVersionInput {
    pub target_id: TargetId,
    pub service_name: String,
    pub author: Option<String>,
    pub outcome: VersionOutcomeInput,
}

/// SQLite-backed registry storage. One connection, serialized writers;
/// every mutating operation runs in a `BEGIN IMMEDIATE` transaction as the
/// defensive layer under the distributed per-target lock.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::invariant("storage mutex poisoned"))
    }

    // ---- organizations / projects / targets -------------------------------

    pub fn upsert_organization(&self, org: &Organization) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO organizations (id, check_retention_days) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET check_retention_days = excluded.check_retention_days",
            params![org.id.as_str(), org.check_retention_days],
        )?;
        Ok(())
    }

    pub fn upsert_project(&self, project: &Project) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO projects (
               id, org_id, project_type, legacy_registry_model,
               compare_to_previous_composable_version,
               external_composition_endpoint, external_composition_secret,
               native_federation, git_repository
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               project_type = excluded.project_type,
               legacy_registry_model = excluded.legacy_registry_model,
               compare_to_previous_composable_version = excluded.compare_to_previous_composable_version,
               external_composition_endpoint = excluded.external_composition_endpoint,
               external_composition_secret = excluded.external_composition_secret,
               native_federation = excluded.native_federation,
               git_repository = excluded.git_repository",
            params![
                project.id.as_str(),
                project.org_id.as_str(),
                project.project_type.as_str(),
                project.legacy_registry_model,
                project.compare_to_previous_composable_version,
                project.external_composition.as_ref().map(|c| c.endpoint.as_str()),
                project.external_composition.as_ref().map(|c| c.secret.as_str()),
                project.native_federation,
                project.git_repository.as_deref(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_target(&self, target: &Target) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO targets (
               id, project_id, org_id, validation_period_days, validation_percentage
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               validation_period_days = excluded.validation_period_days,
               validation_percentage = excluded.validation_percentage",
            params![
                target.id.as_str(),
                target.project_id.as_str(),
                target.org_id.as_str(),
                target.validation_period_days,
                target.validation_percentage,
            ],
        )?;
        Ok(())
    }

    pub fn get_organization(&self, id: &OrganizationId) -> Result<Organization> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT id, check_retention_days FROM organizations WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u16>(1)?,
                ))
            },
        )
        .optional()?
        .map(|(id, retention)| {
            Ok::<Organization, StorageError>(Organization::new(
                OrganizationId::new(id).map_err(|e| StorageError::invariant(e.to_string()))?,
                retention,
            ))
        })
        .transpose()?
        .ok_or_else(|| StorageError::not_found("organization", id.as_str()))
    }

    pub fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT id, org_id, project_type, legacy_registry_model,
                        compare_to_previous_composable_version,
                        external_composition_endpoint, external_composition_secret,
                        native_federation, git_repository
                 FROM projects WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, bool>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::not_found("project", id.as_str()))?;

        let (id, org_id, project_type, legacy, compare_composable, endpoint, secret, native, git) =
            row;
        let mut project = Project::new(
            ProjectId::new(id).map_err(|e| StorageError::invariant(e.to_string()))?,
            OrganizationId::new(org_id).map_err(|e| StorageError::invariant(e.to_string()))?,
            parse_project_type(&project_type)?,
        );
        project.legacy_registry_model = legacy;
        project.compare_to_previous_composable_version = compare_composable;
        project.native_federation = native;
        project.git_repository = git;
        project.external_composition = match (endpoint, secret) {
            (Some(endpoint), Some(secret)) => {
                Some(ExternalCompositionConfig { endpoint, secret })
            }
            _ => None,
        };
        Ok(project)
    }

    pub fn get_target(&self, id: &TargetId) -> Result<Target> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT id, project_id, org_id, validation_period_days, validation_percentage
                 FROM targets WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u16>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StorageError::not_found("target", id.as_str()))?;

        let (id, project_id, org_id, period, percentage) = row;
        let mut target = Target::new(
            TargetId::new(id).map_err(|e| StorageError::invariant(e.to_string()))?,
            ProjectId::new(project_id).map_err(|e| StorageError::invariant(e.to_string()))?,
            OrganizationId::new(org_id).map_err(|e| StorageError::invariant(e.to_string()))?,
        );
        target.validation_period_days = period;
        target.validation_percentage = percentage;
        Ok(target)
    }

    // ---- configuration surface --------------------------------------------

    pub fn update_project_registry_model(&self, id: &ProjectId, legacy: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE projects SET legacy_registry_model = ?2 WHERE id = ?1",
            params![id.as_str(), legacy],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("project", id.as_str()));
        }
        Ok(())
    }

    pub fn enable_external_schema_composition(
        &self,
        id: &ProjectId,
        config: &ExternalCompositionConfig,
    ) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE projects SET external_composition_endpoint = ?2,
                                 external_composition_secret = ?3
             WHERE id = ?1",
            params![id.as_str(), config.endpoint, config.secret],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("project", id.as_str()));
        }
        Ok(())
    }

    pub fn disable_external_schema_composition(&self, id: &ProjectId) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE projects SET external_composition_endpoint = NULL,
                                 external_composition_secret = NULL
             WHERE id = ?1",
            params![id.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("project", id.as_str()));
        }
        Ok(())
    }

    pub fn update_native_federation(&self, id: &ProjectId, enabled: bool) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE projects SET native_federation = ?2 WHERE id = ?1",
            params![id.as_str(), enabled],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("project", id.as_str()));
        }
        Ok(())
    }

    pub fn set_base_schema(&self, id: &TargetId, base_schema: Option<&str>) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE targets SET base_schema = ?2 WHERE id = ?1",
            params![id.as_str(), base_schema],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("target", id.as_str()));
        }
        Ok(())
    }

    pub fn get_base_schema(&self, id: &TargetId) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT base_schema FROM targets WHERE id = ?1",
            params![id.as_str()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("target", id.as_str()))
    }

    // ---- version reads ----------------------------------------------------

    pub fn get_maybe_latest_version(&self, target: &TargetId) -> Result<Option<SchemaVersion>> {
        let conn = self.lock_conn()?;
        latest_version_id(&conn, target, false)?
            .map(|id| load_version(&conn, &id))
            .transpose()
    }

    pub fn get_maybe_latest_valid_version(
        &self,
        target: &TargetId,
    ) -> Result<Option<SchemaVersion>> {
        let conn = self.lock_conn()?;
        latest_version_id(&conn, target, true)?
            .map(|id| load_version(&conn, &id))
            .transpose()
    }

    pub fn get_version(&self, id: &SchemaVersionId) -> Result<SchemaVersion> {
        let conn = self.lock_conn()?;
        load_version(&conn, id)
    }

    /// The active push set of the latest (optionally latest-composable)
    /// version. Empty when the target has no versions yet.
    pub fn get_latest_schemas(
        &self,
        target: &TargetId,
        only_composable: bool,
    ) -> Result<Vec<PushedSchema>> {
        let conn = self.lock_conn()?;
        match latest_version_id(&conn, target, only_composable)? {
            Some(id) => load_active_pushes(&conn, &id),
            None => Ok(Vec::new()),
        }
    }

    // ---- version writes ---------------------------------------------------

    /// Append a version for a push. `action` runs inside the transaction,
    /// after every row is written and before commit; artifact publication
    /// belongs there so a committed version implies durable artifacts. An
    /// action error rolls the whole version back.
    pub fn create_schema_version<F>(
        &self,
        input: CreateVersionInput,
        action: F,
    ) -> Result<SchemaVersion>
    where
        F: FnOnce(&SchemaVersion) -> std::result::Result<(), String>,
    {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let entry_id = SchemaLogId::generate();
        let now = Utc::now();
        let sdl_hash = insert_sdl(&tx, &input.push.sdl)?;
        tx.execute(
            "INSERT INTO schema_log (
               id, target_id, action, service_name, sdl_hash, service_url,
               metadata, author, commit_sha, created_at
             ) VALUES (?1, ?2, 'PUSH', ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry_id.to_string(),
                input.target_id.as_str(),
                input.push.service_name,
                sdl_hash,
                input.push.service_url,
                input
                    .push
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                input.push.author,
                input.push.commit,
                now,
            ],
        )?;

        let entry = SchemaLogEntry::Push(PushedSchema {
            id: entry_id,
            sdl: input.push.sdl.clone(),
            service_name: input.push.service_name.clone(),
            service_url: input.push.service_url.clone(),
            metadata: input.push.metadata.clone(),
            author: input.push.author.clone(),
            commit: input.push.commit.clone(),
        });

        let version = write_version(&tx, &input.target_id, &entry, entry_id, now, input.outcome)?;
        action(&version).map_err(StorageError::action_failed)?;
        tx.commit()?;
        info!(target = %version.target_id, version = %version.id, "schema version created");
        Ok(version)
    }

    /// Append a version for a service delete. Same transactional action
    /// contract as [`Self::create_schema_version`].
    pub fn delete_schema<F>(&self, input: DeleteVersionInput, action: F) -> Result<SchemaVersion>
    where
        F: FnOnce(&SchemaVersion) -> std::result::Result<(), String>,
    {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let entry_id = SchemaLogId::generate();
        let now = Utc::now();
        tx.execute(
            "INSERT INTO schema_log (
               id, target_id, action, service_name, author, created_at
             ) VALUES (?1, ?2, 'DELETE', ?3, ?4, ?5)",
            params![
                entry_id.to_string(),
                input.target_id.as_str(),
                input.service_name,
                input.author,
                now,
            ],
        )?;

        let entry = SchemaLogEntry::Delete(DeletedSchema {
            id: entry_id,
            service_name: input.service_name.clone(),
            author: input.author.clone(),
        });

        let version = write_version(&tx, &input.target_id, &entry, entry_id, now, input.outcome)?;
        action(&version).map_err(StorageError::action_failed)?;
        tx.commit()?;
        info!(target = %version.target_id, version = %version.id, "schema version created for delete");
        Ok(version)
    }

    /// Admin override of a past version's composability. Returns the
    /// refreshed version and the target's new latest-composable pointer so
    /// the caller can decide whether CDN artifacts must be republished.
    pub fn update_version_status(
        &self,
        version_id: &SchemaVersionId,
        valid: bool,
    ) -> Result<(SchemaVersion, Option<SchemaVersionId>)> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "UPDATE schema_versions SET is_composable = ?2 WHERE id = ?1",
            params![version_id.to_string(), valid],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("schema_version", version_id.to_string()));
        }
        let target_id: String = tx.query_row(
            "SELECT target_id FROM schema_versions WHERE id = ?1",
            params![version_id.to_string()],
            |row| row.get(0),
        )?;
        let new_pointer: Option<String> = tx
            .query_row(
                "SELECT id FROM schema_versions
                 WHERE target_id = ?1 AND is_composable = 1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![target_id],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "UPDATE targets SET latest_composable_schema_version_id = ?2 WHERE id = ?1",
            params![target_id, new_pointer],
        )?;

        let version = load_version(&tx, version_id)?;
        tx.commit()?;
        let pointer = new_pointer
            .map(|id| {
                SchemaVersionId::from_str(&id)
                    .map_err(|e| StorageError::invariant(e.to_string()))
            })
            .transpose()?;
        Ok((version, pointer))
    }

    // ---- checks -----------------------------------------------------------

    pub fn create_schema_check(&self, check: &SchemaCheck) -> Result<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let sdl_hash = insert_sdl(&tx, &check.schema_sdl)?;
        let composite_hash = check
            .composite_schema_sdl
            .as_deref()
            .map(|sdl| insert_sdl(&tx, sdl))
            .transpose()?;
        let supergraph_hash = check
            .supergraph_sdl
            .as_deref()
            .map(|sdl| insert_sdl(&tx, sdl))
            .transpose()?;

        tx.execute(
            "INSERT INTO schema_checks (
               id, target_id, schema_sdl_hash, service_name, schema_version_id,
               is_success, breaking_schema_changes, safe_schema_changes,
               schema_policy_warnings, schema_policy_errors, composition_errors,
               composite_schema_sdl_hash, supergraph_sdl_hash, contract_checks,
               context_id, github_repository, github_pull_request_number,
               github_commit_sha, is_manually_approved, manual_approver,
               created_at, expires_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                check.id.to_string(),
                check.target_id.as_str(),
                sdl_hash,
                check.service_name,
                check.schema_version_id.map(|id| id.to_string()),
                check.is_success,
                serde_json::to_string(&check.breaking_schema_changes)?,
                serde_json::to_string(&check.safe_schema_changes)?,
                serde_json::to_string(&check.schema_policy_warnings)?,
                serde_json::to_string(&check.schema_policy_errors)?,
                serde_json::to_string(&check.composition_errors)?,
                composite_hash,
                supergraph_hash,
                serde_json::to_string(&check.contract_checks)?,
                check.context_id.as_ref().map(ContextId::as_str),
                check.github.as_ref().map(|g| g.repository.as_str()),
                check.github.as_ref().and_then(|g| g.pull_request_number),
                check.github.as_ref().and_then(|g| g.commit_sha.as_deref()),
                check.is_manually_approved,
                check.manual_approver,
                check.created_at,
                check.expires_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_schema_check(&self, id: &SchemaCheckId) -> Result<SchemaCheck> {
        let conn = self.lock_conn()?;
        load_check(&conn, id)
    }

    /// Promote every breaking change of a failing check into approvals
    /// scoped to the check's context id. The snapshots keep the approver
    /// and timestamp, so later checks report the original reviewer.
    pub fn approve_failed_schema_check(
        &self,
        id: &SchemaCheckId,
        approved_by: &str,
    ) -> Result<SchemaCheck> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut check = load_check(&tx, id)?;
        if check.is_success {
            return Err(StorageError::conflict(
                "only a failing check can be approved",
            ));
        }
        let Some(context_id) = check.context_id.clone() else {
            return Err(StorageError::conflict(
                "check has no context id to scope approvals to",
            ));
        };

        let now = Utc::now();
        for change in &mut check.breaking_schema_changes {
            change.approval = Some(ChangeApprovalMetadata {
                approved_by: approved_by.to_string(),
                approved_at: now,
                schema_check_id: *id,
            });
            tx.execute(
                "INSERT INTO schema_change_approvals (
                   target_id, context_id, schema_change_id, change, approved_by, approved_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(target_id, context_id, schema_change_id) DO NOTHING",
                params![
                    check.target_id.as_str(),
                    context_id.as_str(),
                    change.id,
                    serde_json::to_string(change)?,
                    approved_by,
                    now,
                ],
            )?;
        }

        tx.execute(
            "UPDATE schema_checks SET is_manually_approved = 1, manual_approver = ?2
             WHERE id = ?1",
            params![id.to_string(), approved_by],
        )?;
        tx.commit()?;

        check.is_manually_approved = true;
        check.manual_approver = Some(approved_by.to_string());
        Ok(check)
    }

    pub fn get_approved_schema_changes_for_context_id(
        &self,
        target: &TargetId,
        context_id: &ContextId,
    ) -> Result<BTreeMap<String, SchemaChangeApproval>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT schema_change_id, change, approved_by, approved_at
             FROM schema_change_approvals
             WHERE target_id = ?1 AND context_id = ?2
             ORDER BY schema_change_id",
        )?;
        let rows = stmt.query_map(params![target.as_str(), context_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, DateTime<Utc>>(3)?,
            ))
        })?;

        let mut approvals = BTreeMap::new();
        for row in rows {
            let (change_id, change_json, approved_by, approved_at) = row?;
            let change: SchemaChange = serde_json::from_str(&change_json)?;
            approvals.insert(
                change_id.clone(),
                SchemaChangeApproval {
                    target_id: target.clone(),
                    context_id: context_id.clone(),
                    schema_change_id: change_id,
                    change,
                    approved_by,
                    approved_at,
                },
            );
        }
        Ok(approvals)
    }

    /// Delete exactly the checks whose `expires_at` is at or before the
    /// cutoff. Approvals are keyed by context id and survive.
    pub fn purge_expired_schema_checks(&self, expires_at: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM schema_checks WHERE expires_at <= ?1",
            params![expires_at],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // ---- contracts --------------------------------------------------------

    pub fn create_contract(&self, contract: &Contract) -> Result<()> {
        contract
            .validate()
            .map_err(|reason| StorageError::conflict(reason))?;
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT INTO contracts (
               id, target_id, contract_name, include_tags, exclude_tags,
               remove_unreachable_types_from_public_api_schema, is_disabled, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(target_id, contract_name) DO NOTHING",
            params![
                contract.id.to_string(),
                contract.target_id.as_str(),
                contract.contract_name,
                serde_json::to_string(&contract.include_tags)?,
                serde_json::to_string(&contract.exclude_tags)?,
                contract.remove_unreachable_types_from_public_api_schema,
                contract.is_disabled,
                contract.created_at,
            ],
        )?;
        if inserted == 0 {
            return Err(StorageError::conflict(format!(
                "contract `{}` already exists for target `{}`",
                contract.contract_name, contract.target_id
            )));
        }
        Ok(())
    }

    pub fn disable_contract(&self, id: &ContractId) -> Result<()> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE contracts SET is_disabled = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if updated == 0 {
            return Err(StorageError::not_found("contract", id.to_string()));
        }
        Ok(())
    }

    pub fn get_active_contracts(&self, target: &TargetId) -> Result<Vec<Contract>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, contract_name, include_tags, exclude_tags,
                    remove_unreachable_types_from_public_api_schema, is_disabled, created_at
             FROM contracts WHERE target_id = ?1 AND is_disabled = 0
             ORDER BY contract_name",
        )?;
        let rows = stmt.query_map(params![target.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, bool>(6)?,
                row.get::<_, DateTime<Utc>>(7)?,
            ))
        })?;

        let mut contracts = Vec::new();
        for row in rows {
            let (id, target_id, name, include, exclude, remove_unreachable, disabled, created) =
                row?;
            contracts.push(Contract {
                id: parse_uuid_id(&id, ContractId::from_uuid)?,
                target_id: TargetId::new(target_id)
                    .map_err(|e| StorageError::invariant(e.to_string()))?,
                contract_name: name,
                include_tags: serde_json::from_str(&include)?,
                exclude_tags: serde_json::from_str(&exclude)?,
                remove_unreachable_types_from_public_api_schema: remove_unreachable,
                is_disabled: disabled,
                created_at: created,
            });
        }
        Ok(contracts)
    }

    /// The most recent composable record per contract, used as the diff
    /// baseline for the next check of that contract.
    pub fn get_latest_valid_contract_version(
        &self,
        contract_id: &ContractId,
    ) -> Result<Option<SchemaVersionContract>> {
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                "SELECT c.id, c.schema_version_id, c.contract_id, c.contract_name,
                        c.is_composable, cs.sdl, sg.sdl, c.schema_composition_errors,
                        c.last_schema_version_contract_id, c.created_at
                 FROM schema_version_contracts c
                 LEFT JOIN sdl_store cs ON cs.hash = c.composite_schema_sdl_hash
                 LEFT JOIN sdl_store sg ON sg.hash = c.supergraph_sdl_hash
                 WHERE c.contract_id = ?1 AND c.is_composable = 1
                 ORDER BY c.created_at DESC, c.id DESC LIMIT 1",
                params![contract_id.to_string()],
                map_contract_version_row,
            )
            .optional()?;
        row.map(finish_contract_version_row).transpose()
    }

    /// All contract records written alongside one schema version.
    pub fn get_version_contracts(
        &self,
        version_id: &SchemaVersionId,
    ) -> Result<Vec<SchemaVersionContract>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.schema_version_id, c.contract_id, c.contract_name,
                    c.is_composable, cs.sdl, sg.sdl, c.schema_composition_errors,
                    c.last_schema_version_contract_id, c.created_at
             FROM schema_version_contracts c
             LEFT JOIN sdl_store cs ON cs.hash = c.composite_schema_sdl_hash
             LEFT JOIN sdl_store sg ON sg.hash = c.supergraph_sdl_hash
             WHERE c.schema_version_id = ?1
             ORDER BY c.contract_name",
        )?;
        let rows = stmt.query_map(params![version_id.to_string()], map_contract_version_row)?;
        let mut contracts = Vec::new();
        for row in rows {
            contracts.push(finish_contract_version_row(row?)?);
        }
        Ok(contracts)
    }

    // ---- sdl store --------------------------------------------------------

    pub fn sdl_store_get(&self, hash: &str) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        Ok(conn
            .query_row(
                "SELECT sdl FROM sdl_store WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn sdl_store_insert(&self, sdl: &str) -> Result<String> {
        let conn = self.lock_conn()?;
        insert_sdl(&conn, sdl)
    }
}

// ---- row plumbing ----------------------------------------------------------

fn parse_project_type(value: &str) -> Result<ProjectType> {
    match value {
        "single" => Ok(ProjectType::Single),
        "federation" => Ok(ProjectType::Federation),
        "stitching" => Ok(ProjectType::Stitching),
        other => Err(StorageError::invariant(format!(
            "unknown project type `{other}`"
        ))),
    }
}

fn parse_uuid_id<T>(value: &str, wrap: impl FnOnce(Uuid) -> T) -> Result<T> {
    Uuid::parse_str(value)
        .map(wrap)
        .map_err(|e| StorageError::invariant(format!("malformed uuid column: {e}")))
}

fn insert_sdl(conn: &Connection, sdl: &str) -> Result<String> {
    let hash = sha256_hex(sdl.as_bytes());
    conn.execute(
        "INSERT INTO sdl_store (hash, sdl) VALUES (?1, ?2) ON CONFLICT(hash) DO NOTHING",
        params![hash, sdl],
    )?;
    Ok(hash)
}

fn latest_version_id(
    conn: &Connection,
    target: &TargetId,
    only_composable: bool,
) -> Result<Option<SchemaVersionId>> {
    let column = if only_composable {
        "latest_composable_schema_version_id"
    } else {
        "latest_schema_version_id"
    };
    let id: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT {column} FROM targets WHERE id = ?1"),
            params![target.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        None => Err(StorageError::not_found("target", target.as_str())),
        Some(None) => Ok(None),
        Some(Some(id)) => Ok(Some(
            SchemaVersionId::from_str(&id).map_err(|e| StorageError::invariant(e.to_string()))?,
        )),
    }
}

fn load_active_pushes(conn: &Connection, version_id: &SchemaVersionId) -> Result<Vec<PushedSchema>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.service_name, s.sdl, l.service_url, l.metadata, l.author, l.commit_sha
         FROM schema_version_to_log vl
         JOIN schema_log l ON l.id = vl.log_id
         LEFT JOIN sdl_store s ON s.hash = l.sdl_hash
         WHERE vl.version_id = ?1 AND l.action = 'PUSH'
         ORDER BY l.service_name",
    )?;
    let rows = stmt.query_map(params![version_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut pushes = Vec::new();
    for row in rows {
        let (id, service_name, sdl, service_url, metadata, author, commit) = row?;
        pushes.push(PushedSchema {
            id: parse_uuid_id(&id, SchemaLogId::from_uuid)?,
            sdl: sdl.ok_or_else(|| {
                StorageError::invariant("push log entry without sdl body")
            })?,
            service_name,
            service_url,
            metadata: metadata.map(|m| serde_json::from_str(&m)).transpose()?,
            author: author.unwrap_or_default(),
            commit: commit.unwrap_or_default(),
        });
    }
    Ok(pushes)
}

fn load_version(conn: &Connection, id: &SchemaVersionId) -> Result<SchemaVersion> {
    let row = conn
        .query_row(
            "SELECT v.id, v.target_id, v.created_at, v.is_composable,
                    v.previous_schema_version_id, v.base_schema, cs.sdl, sg.sdl,
                    v.tags, v.schema_composition_errors
             FROM schema_versions v
             LEFT JOIN sdl_store cs ON cs.hash = v.composite_schema_sdl_hash
             LEFT JOIN sdl_store sg ON sg.hash = v.supergraph_sdl_hash
             WHERE v.id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, DateTime<Utc>>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("schema_version", id.to_string()))?;

    let (
        version_id,
        target_id,
        created_at,
        is_composable,
        previous_id,
        base_schema,
        composite_sdl,
        supergraph_sdl,
        tags,
        composition_errors,
    ) = row;

    let version_id = parse_uuid_id(&version_id, SchemaVersionId::from_uuid)?;
    let schemas = load_active_pushes(conn, &version_id)?;
    let log_ids = schemas.iter().map(|p| p.id).collect();

    Ok(SchemaVersion {
        id: version_id,
        target_id: TargetId::new(target_id).map_err(|e| StorageError::invariant(e.to_string()))?,
        created_at,
        is_composable,
        previous_schema_version_id: previous_id
            .map(|id| parse_uuid_id(&id, SchemaVersionId::from_uuid))
            .transpose()?,
        base_schema,
        composite_schema_sdl: composite_sdl,
        supergraph_sdl,
        tags: tags.map(|t| serde_json::from_str(&t)).transpose()?,
        schema_composition_errors: composition_errors
            .map(|e| serde_json::from_str(&e))
            .transpose()?,
        log_ids,
        schemas,
    })
}

fn write_version(
    tx: &rusqlite::Transaction<'_>,
    target_id: &TargetId,
    entry: &SchemaLogEntry,
    entry_id: SchemaLogId,
    now: DateTime<Utc>,
    outcome: VersionOutcomeInput,
) -> Result<SchemaVersion> {
    let base_schema: Option<String> = tx
        .query_row(
            "SELECT base_schema FROM targets WHERE id = ?1",
            params![target_id.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("target", target_id.as_str()))?;

    let previous_id = latest_version_id(tx, target_id, false)?;
    let previous_pushes = match &previous_id {
        Some(id) => load_active_pushes(tx, id)?,
        None => Vec::new(),
    };
    let active = swap_services(&previous_pushes, entry);

    let version_id = SchemaVersionId::generate();
    let composite_hash = outcome
        .composite_schema_sdl
        .as_deref()
        .map(|sdl| insert_sdl(tx, sdl))
        .transpose()?;
    let supergraph_hash = outcome
        .supergraph_sdl
        .as_deref()
        .map(|sdl| insert_sdl(tx, sdl))
        .transpose()?;

    tx.execute(
        "INSERT INTO schema_versions (
           id, target_id, created_at, is_composable, previous_schema_version_id,
           base_schema, composite_schema_sdl_hash, supergraph_sdl_hash, tags,
           schema_composition_errors, action_log_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            version_id.to_string(),
            target_id.as_str(),
            now,
            outcome.is_composable,
            previous_id.map(|id| id.to_string()),
            base_schema,
            composite_hash,
            supergraph_hash,
            outcome
                .tags
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            outcome
                .schema_composition_errors
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            entry_id.to_string(),
        ],
    )?;

    for push in &active {
        tx.execute(
            "INSERT INTO schema_version_to_log (version_id, log_id) VALUES (?1, ?2)",
            params![version_id.to_string(), push.id.to_string()],
        )?;
    }
    for change in &outcome.changes {
        tx.execute(
            "INSERT INTO schema_version_changes (version_id, change_id, change)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(version_id, change_id) DO NOTHING",
            params![
                version_id.to_string(),
                change.id,
                serde_json::to_string(change)?
            ],
        )?;
    }

    for contract in &outcome.contracts {
        let last_id: Option<String> = tx
            .query_row(
                "SELECT id FROM schema_version_contracts
                 WHERE contract_id = ?1 AND is_composable = 1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![contract.contract_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let contract_version_id = ContractVersionId::generate();
        let composite_hash = contract
            .composite_schema_sdl
            .as_deref()
            .map(|sdl| insert_sdl(tx, sdl))
            .transpose()?;
        let supergraph_hash = contract
            .supergraph_sdl
            .as_deref()
            .map(|sdl| insert_sdl(tx, sdl))
            .transpose()?;
        tx.execute(
            "INSERT INTO schema_version_contracts (
               id, schema_version_id, contract_id, contract_name, is_composable,
               composite_schema_sdl_hash, supergraph_sdl_hash,
               schema_composition_errors, last_schema_version_contract_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                contract_version_id.to_string(),
                version_id.to_string(),
                contract.contract_id.to_string(),
                contract.contract_name,
                contract.is_composable,
                composite_hash,
                supergraph_hash,
                contract
                    .schema_composition_errors
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                last_id,
                now,
            ],
        )?;
        for change in &contract.changes {
            tx.execute(
                "INSERT INTO schema_version_contract_changes (
                   schema_version_contract_id, change_id, change
                 ) VALUES (?1, ?2, ?3)
                 ON CONFLICT(schema_version_contract_id, change_id) DO NOTHING",
                params![
                    contract_version_id.to_string(),
                    change.id,
                    serde_json::to_string(change)?
                ],
            )?;
        }
    }

    tx.execute(
        "UPDATE targets SET latest_schema_version_id = ?2 WHERE id = ?1",
        params![target_id.as_str(), version_id.to_string()],
    )?;
    if outcome.is_composable {
        tx.execute(
            "UPDATE targets SET latest_composable_schema_version_id = ?2 WHERE id = ?1",
            params![target_id.as_str(), version_id.to_string()],
        )?;
    }

    let version = SchemaVersion {
        id: version_id,
        target_id: target_id.clone(),
        created_at: now,
        is_composable: outcome.is_composable,
        previous_schema_version_id: previous_id,
        base_schema,
        composite_schema_sdl: outcome.composite_schema_sdl,
        supergraph_sdl: outcome.supergraph_sdl,
        tags: outcome.tags,
        schema_composition_errors: outcome.schema_composition_errors,
        log_ids: active.iter().map(|p| p.id).collect(),
        schemas: active,
    };
    version
        .validate()
        .map_err(|message| StorageError::invariant(message))?;
    Ok(version)
}

type ContractVersionRow = (
    String,
    String,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

fn map_contract_version_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContractVersionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn finish_contract_version_row(row: ContractVersionRow) -> Result<SchemaVersionContract> {
    let (
        id,
        schema_version_id,
        contract_id,
        contract_name,
        is_composable,
        composite_sdl,
        supergraph_sdl,
        composition_errors,
        last_id,
        created_at,
    ) = row;
    Ok(SchemaVersionContract {
        id: parse_uuid_id(&id, ContractVersionId::from_uuid)?,
        schema_version_id: parse_uuid_id(&schema_version_id, SchemaVersionId::from_uuid)?,
        contract_id: parse_uuid_id(&contract_id, ContractId::from_uuid)?,
        contract_name,
        is_composable,
        composite_schema_sdl: composite_sdl,
        supergraph_sdl,
        schema_composition_errors: composition_errors
            .map(|e| serde_json::from_str(&e))
            .transpose()?,
        last_schema_version_contract_id: last_id
            .map(|id| parse_uuid_id(&id, ContractVersionId::from_uuid))
            .transpose()?,
        created_at,
    })
}

fn load_check(conn: &Connection, id: &SchemaCheckId) -> Result<SchemaCheck> {
    let row = conn
        .query_row(
            "SELECT c.id, c.target_id, s.sdl, c.service_name, c.schema_version_id,
                    c.is_success, c.breaking_schema_changes, c.safe_schema_changes,
                    c.schema_policy_warnings, c.schema_policy_errors, c.composition_errors,
                    cs.sdl, sg.sdl, c.contract_checks, c.context_id,
                    c.github_repository, c.github_pull_request_number, c.github_commit_sha,
                    c.is_manually_approved, c.manual_approver, c.created_at, c.expires_at
             FROM schema_checks c
             JOIN sdl_store s ON s.hash = c.schema_sdl_hash
             LEFT JOIN sdl_store cs ON cs.hash = c.composite_schema_sdl_hash
             LEFT JOIN sdl_store sg ON sg.hash = c.supergraph_sdl_hash
             WHERE c.id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, Option<String>>(12)?,
                    row.get::<_, String>(13)?,
                    row.get::<_, Option<String>>(14)?,
                    row.get::<_, Option<String>>(15)?,
                    row.get::<_, Option<u64>>(16)?,
                    row.get::<_, Option<String>>(17)?,
                    row.get::<_, bool>(18)?,
                    row.get::<_, Option<String>>(19)?,
                    row.get::<_, DateTime<Utc>>(20)?,
                    row.get::<_, DateTime<Utc>>(21)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StorageError::not_found("schema_check", id.to_string()))?;

    let (
        check_id,
        target_id,
        schema_sdl,
        service_name,
        schema_version_id,
        is_success,
        breaking,
        safe,
        warnings,
        errors,
        composition_errors,
        composite_sdl,
        supergraph_sdl,
        contract_checks,
        context_id,
        github_repository,
        github_pr,
        github_sha,
        is_manually_approved,
        manual_approver,
        created_at,
        expires_at,
    ) = row;

    Ok(SchemaCheck {
        id: parse_uuid_id(&check_id, SchemaCheckId::from_uuid)?,
        target_id: TargetId::new(target_id).map_err(|e| StorageError::invariant(e.to_string()))?,
        schema_sdl,
        service_name,
        schema_version_id: schema_version_id
            .map(|id| parse_uuid_id(&id, SchemaVersionId::from_uuid))
            .transpose()?,
        is_success,
        breaking_schema_changes: serde_json::from_str(&breaking)?,
        safe_schema_changes: serde_json::from_str(&safe)?,
        schema_policy_warnings: serde_json::from_str(&warnings)?,
        schema_policy_errors: serde_json::from_str(&errors)?,
        composition_errors: serde_json::from_str(&composition_errors)?,
        composite_schema_sdl: composite_sdl,
        supergraph_sdl,
        contract_checks: serde_json::from_str(&contract_checks)?,
        context_id: context_id
            .map(ContextId::new)
            .transpose()
            .map_err(|e| StorageError::invariant(e.to_string()))?,
        github: github_repository.map(|repository| GitHubIntegrationMetadata {
            repository,
            pull_request_number: github_pr,
            commit_sha: github_sha,
        }),
        is_manually_approved,
        manual_approver,
        created_at,
        expires_at,
    })
}

// SPDX-License-Identifier: Apache-2.0

//! Relational layout. User-visible column names (`tags`,
//! `previous_schema_version_id`, the table names) are stable surface; the
//! rest is free to follow SQLite idiom. Large SDL bodies live in
//! `sdl_store` by content hash and are joined back on read.

pub const STORE_SCHEMA_VERSION: i64 = 1;

pub const DDL: &str = "
PRAGMA journal_mode=WAL;
PRAGMA foreign_keys=ON;
PRAGMA synchronous=NORMAL;

CREATE TABLE IF NOT EXISTS organizations (
  id TEXT PRIMARY KEY,
  check_retention_days INTEGER NOT NULL DEFAULT 30
);

CREATE TABLE IF NOT EXISTS projects (
  id TEXT PRIMARY KEY,
  org_id TEXT NOT NULL REFERENCES organizations(id),
  project_type TEXT NOT NULL,
  legacy_registry_model INTEGER NOT NULL DEFAULT 0,
  compare_to_previous_composable_version INTEGER NOT NULL DEFAULT 0,
  external_composition_endpoint TEXT,
  external_composition_secret TEXT,
  native_federation INTEGER NOT NULL DEFAULT 0,
  git_repository TEXT
);

CREATE TABLE IF NOT EXISTS targets (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id),
  org_id TEXT NOT NULL REFERENCES organizations(id),
  validation_period_days INTEGER NOT NULL DEFAULT 30,
  validation_percentage REAL NOT NULL DEFAULT 0.0,
  base_schema TEXT,
  latest_schema_version_id TEXT,
  latest_composable_schema_version_id TEXT
);

CREATE TABLE IF NOT EXISTS sdl_store (
  hash TEXT PRIMARY KEY,
  sdl TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_log (
  id TEXT PRIMARY KEY,
  target_id TEXT NOT NULL REFERENCES targets(id),
  action TEXT NOT NULL CHECK (action IN ('PUSH', 'DELETE')),
  service_name TEXT NOT NULL,
  sdl_hash TEXT REFERENCES sdl_store(hash),
  service_url TEXT,
  metadata TEXT,
  author TEXT,
  commit_sha TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_versions (
  id TEXT PRIMARY KEY,
  target_id TEXT NOT NULL REFERENCES targets(id),
  created_at TEXT NOT NULL,
  is_composable INTEGER NOT NULL,
  previous_schema_version_id TEXT REFERENCES schema_versions(id),
  base_schema TEXT,
  composite_schema_sdl_hash TEXT REFERENCES sdl_store(hash),
  supergraph_sdl_hash TEXT REFERENCES sdl_store(hash),
  tags TEXT,
  schema_composition_errors TEXT,
  action_log_id TEXT NOT NULL REFERENCES schema_log(id)
);
CREATE INDEX IF NOT EXISTS idx_schema_versions_target
  ON schema_versions(target_id, created_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS schema_version_to_log (
  version_id TEXT NOT NULL REFERENCES schema_versions(id),
  log_id TEXT NOT NULL REFERENCES schema_log(id),
  PRIMARY KEY (version_id, log_id)
);

CREATE TABLE IF NOT EXISTS schema_version_changes (
  version_id TEXT NOT NULL REFERENCES schema_versions(id),
  change_id TEXT NOT NULL,
  change TEXT NOT NULL,
  PRIMARY KEY (version_id, change_id)
);

CREATE TABLE IF NOT EXISTS schema_checks (
  id TEXT PRIMARY KEY,
  target_id TEXT NOT NULL REFERENCES targets(id),
  schema_sdl_hash TEXT NOT NULL REFERENCES sdl_store(hash),
  service_name TEXT,
  schema_version_id TEXT REFERENCES schema_versions(id),
  is_success INTEGER NOT NULL,
  breaking_schema_changes TEXT NOT NULL,
  safe_schema_changes TEXT NOT NULL,
  schema_policy_warnings TEXT NOT NULL,
  schema_policy_errors TEXT NOT NULL,
  composition_errors TEXT NOT NULL,
  composite_schema_sdl_hash TEXT REFERENCES sdl_store(hash),
  supergraph_sdl_hash TEXT REFERENCES sdl_store(hash),
  contract_checks TEXT NOT NULL,
  context_id TEXT,
  github_repository TEXT,
  github_pull_request_number INTEGER,
  github_commit_sha TEXT,
  is_manually_approved INTEGER NOT NULL DEFAULT 0,
  manual_approver TEXT,
  created_at TEXT NOT NULL,
  expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_schema_checks_expiry ON schema_checks(expires_at);
CREATE INDEX IF NOT EXISTS idx_schema_checks_target ON schema_checks(target_id, created_at DESC);

CREATE TABLE IF NOT EXISTS schema_change_approvals (
  target_id TEXT NOT NULL REFERENCES targets(id),
  context_id TEXT NOT NULL,
  schema_change_id TEXT NOT NULL,
  change TEXT NOT NULL,
  approved_by TEXT NOT NULL,
  approved_at TEXT NOT NULL,
  PRIMARY KEY (target_id, context_id, schema_change_id)
);

CREATE TABLE IF NOT EXISTS contracts (
  id TEXT PRIMARY KEY,
  target_id TEXT NOT NULL REFERENCES targets(id),
  contract_name TEXT NOT NULL,
  include_tags TEXT NOT NULL,
  exclude_tags TEXT NOT NULL,
  remove_unreachable_types_from_public_api_schema INTEGER NOT NULL,
  is_disabled INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  UNIQUE (target_id, contract_name)
);

CREATE TABLE IF NOT EXISTS schema_version_contracts (
  id TEXT PRIMARY KEY,
  schema_version_id TEXT NOT NULL REFERENCES schema_versions(id),
  contract_id TEXT NOT NULL REFERENCES contracts(id),
  contract_name TEXT NOT NULL,
  is_composable INTEGER NOT NULL,
  composite_schema_sdl_hash TEXT REFERENCES sdl_store(hash),
  supergraph_sdl_hash TEXT REFERENCES sdl_store(hash),
  schema_composition_errors TEXT,
  last_schema_version_contract_id TEXT REFERENCES schema_version_contracts(id),
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_schema_version_contracts_chain
  ON schema_version_contracts(contract_id, created_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS schema_version_contract_changes (
  schema_version_contract_id TEXT NOT NULL REFERENCES schema_version_contracts(id),
  change_id TEXT NOT NULL,
  change TEXT NOT NULL,
  PRIMARY KEY (schema_version_contract_id, change_id)
);
";

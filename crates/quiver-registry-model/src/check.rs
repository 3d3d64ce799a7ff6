// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CompositionError, ContextId, ContractCheckResult, SchemaChange, SchemaCheckId,
    SchemaVersionId, TargetId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PolicySeverity {
    Warning,
    Error,
}

impl PolicySeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One policy finding as stored on a check record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaPolicyIssue {
    pub rule_id: String,
    pub severity: PolicySeverity,
    pub message: String,
    /// Schema coordinate the rule fired on, when the rule has one.
    pub coordinate: Option<String>,
}

/// Source-control metadata attached by CI integrations. Used to synthesize
/// a context id (`repo#pr`) when no explicit one was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubIntegrationMetadata {
    pub repository: String,
    pub pull_request_number: Option<u64>,
    pub commit_sha: Option<String>,
}

/// The record of a proposed change that did not advance the target. Both
/// passing and failing checks are recorded; they expire and are purged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCheck {
    pub id: SchemaCheckId,
    pub target_id: TargetId,
    pub schema_sdl: String,
    pub service_name: Option<String>,
    /// Baseline version the check compared against; null on an initial check.
    pub schema_version_id: Option<SchemaVersionId>,
    pub is_success: bool,
    pub breaking_schema_changes: Vec<SchemaChange>,
    pub safe_schema_changes: Vec<SchemaChange>,
    pub schema_policy_warnings: Vec<SchemaPolicyIssue>,
    pub schema_policy_errors: Vec<SchemaPolicyIssue>,
    pub composition_errors: Vec<CompositionError>,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub contract_checks: Vec<ContractCheckResult>,
    pub context_id: Option<ContextId>,
    pub github: Option<GitHubIntegrationMetadata>,
    pub is_manually_approved: bool,
    pub manual_approver: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SchemaCheck {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

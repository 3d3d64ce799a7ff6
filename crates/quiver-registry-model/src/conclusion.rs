// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::{
    CompositionError, ContractCheckResult, ContractPublishState, SchemaChange, SchemaPolicyIssue,
};

/// Successful composition as carried inside conclusions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionSuccessState {
    pub composite_schema_sdl: String,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaCheckSuccessState {
    pub composition: Option<CompositionSuccessState>,
    pub schema_changes: Vec<SchemaChange>,
    pub schema_policy_warnings: Vec<SchemaPolicyIssue>,
    pub contract_checks: Vec<ContractCheckResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchemaCheckFailureState {
    pub composition_errors: Vec<CompositionError>,
    pub breaking_changes: Vec<SchemaChange>,
    pub safe_changes: Vec<SchemaChange>,
    pub schema_policy_warnings: Vec<SchemaPolicyIssue>,
    pub schema_policy_errors: Vec<SchemaPolicyIssue>,
    pub contract_checks: Vec<ContractCheckResult>,
    /// Kept for diagnostics when composition produced SDL alongside errors.
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
}

/// Conclusion of a `check` run. `Success(None)` means the incoming schema
/// was byte-identical to the baseline after canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "conclusion", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SchemaCheckConclusion {
    Success { state: Option<SchemaCheckSuccessState> },
    Failure { state: SchemaCheckFailureState },
}

impl SchemaCheckConclusion {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum PublishIgnoreReason {
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PublishRejectReason {
    MissingServiceName,
    MissingServiceUrl,
    InvalidServiceUrl { given: String },
    MetadataParsingFailure { message: String },
    CompositionFailure { errors: Vec<CompositionError> },
    /// Legacy models only: breaking changes block a publish unless forced.
    BreakingChanges { changes: Vec<SchemaChange> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPublishState {
    pub composable: bool,
    /// True when the target had no prior version.
    pub initial: bool,
    pub changes: Vec<SchemaChange>,
    pub breaking_changes: Vec<SchemaChange>,
    pub composition_errors: Vec<CompositionError>,
    pub full_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
    pub contracts: Vec<ContractPublishState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "conclusion", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SchemaPublishConclusion {
    Publish { state: SchemaPublishState },
    Ignore { reason: PublishIgnoreReason },
    Reject { reason: PublishRejectReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeleteRejectReason {
    MissingServiceName,
    UnknownServiceName { given: String },
    CompositionFailure { errors: Vec<CompositionError> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDeleteState {
    pub composable: bool,
    pub changes: Vec<SchemaChange>,
    pub breaking_changes: Vec<SchemaChange>,
    pub composition_errors: Vec<CompositionError>,
    pub full_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "conclusion", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SchemaDeleteConclusion {
    Accept { state: SchemaDeleteState },
    Reject { reason: DeleteRejectReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conclusion_tags_serialize_for_the_audit_log() {
        let ignore = SchemaPublishConclusion::Ignore {
            reason: PublishIgnoreReason::NoChanges,
        };
        let encoded = serde_json::to_value(&ignore).expect("serialize");
        assert_eq!(encoded["conclusion"], "ignore");
        assert_eq!(encoded["reason"], "no_changes");
    }
}

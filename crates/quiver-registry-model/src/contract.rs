// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CompositionError, ContractId, ContractVersionId, SchemaChange, SchemaVersionId, TargetId,
};

/// A named tag filter owned by a target. Immutable once created; disabling
/// is the only permitted mutation and stops artifact production for later
/// versions without touching history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contract {
    pub id: ContractId,
    pub target_id: TargetId,
    pub contract_name: String,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub remove_unreachable_types_from_public_api_schema: bool,
    pub is_disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.contract_name.is_empty() {
            return Err("contract_name must not be empty");
        }
        if self.include_tags.is_empty() && self.exclude_tags.is_empty() {
            return Err("contract must include or exclude at least one tag");
        }
        if self
            .include_tags
            .iter()
            .any(|t| self.exclude_tags.contains(t))
        {
            return Err("a tag cannot be both included and excluded");
        }
        Ok(())
    }
}

/// Per-contract composition outcome recorded for every composable version of
/// a contract-bearing target. Chains to the previous successful record for
/// the same contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersionContract {
    pub id: ContractVersionId,
    pub schema_version_id: SchemaVersionId,
    pub contract_id: ContractId,
    pub contract_name: String,
    pub is_composable: bool,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub schema_composition_errors: Option<Vec<CompositionError>>,
    pub last_schema_version_contract_id: Option<ContractVersionId>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of checking one contract within a schema check. A contract check
/// succeeds when its composition completed and its diff is not failing;
/// failures are isolated per contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCheckResult {
    pub contract_id: ContractId,
    pub contract_name: String,
    pub is_successful: bool,
    pub composition_errors: Vec<CompositionError>,
    pub breaking_changes: Vec<SchemaChange>,
    pub safe_changes: Vec<SchemaChange>,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
}

/// Per-contract artifacts captured by an accepted publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPublishState {
    pub contract_id: ContractId,
    pub contract_name: String,
    pub is_composable: bool,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub composition_errors: Vec<CompositionError>,
    pub changes: Vec<SchemaChange>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> Contract {
        Contract {
            id: ContractId::generate(),
            target_id: TargetId::new("staging").expect("target id"),
            contract_name: "public".to_string(),
            include_tags: vec!["public".to_string()],
            exclude_tags: vec!["internal".to_string()],
            remove_unreachable_types_from_public_api_schema: true,
            is_disabled: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn contract_tag_sets_must_be_disjoint() {
        assert!(contract().validate().is_ok());

        let mut overlapping = contract();
        overlapping.exclude_tags = vec!["public".to_string()];
        assert!(overlapping.validate().is_err());
    }

    #[test]
    fn contract_needs_at_least_one_tag() {
        let mut empty = contract();
        empty.include_tags.clear();
        empty.exclude_tags.clear();
        assert!(empty.validate().is_err());
    }
}

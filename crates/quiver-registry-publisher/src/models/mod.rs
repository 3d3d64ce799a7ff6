// SPDX-License-Identifier: Apache-2.0

//! The four project models. Each variant sequences the check primitives
//! into `check` / `publish` / `delete` conclusions; dispatch is a plain sum
//! type keyed by `(project_type, legacy_flag)`. Legacy variants honor
//! `force`, skip policy evaluation, and collapse contract handling.

mod composite;
mod reduce;
mod single;

use std::collections::BTreeMap;
use std::fmt;

use quiver_registry_compose::{
    CompositionOptions, ContractFilter, ContractInput, Orchestrator, OrchestratorError,
};
use quiver_registry_inspect::{UsageOracle, UsageOracleError, UsageSelector};
use quiver_registry_model::{
    Contract, Organization, Project, ProjectType, SchemaChangeApproval, SchemaCheckConclusion,
    SchemaDeleteConclusion, SchemaPublishConclusion, SchemaVersion, SchemaVersionContract, Target,
};
use quiver_registry_policies::{PolicyEngine, PolicyEngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryModel {
    SingleModern,
    SingleLegacy,
    CompositeModern,
    CompositeLegacy,
}

impl RegistryModel {
    #[must_use]
    pub const fn select(project_type: ProjectType, legacy: bool) -> Self {
        match (project_type.is_composite(), legacy) {
            (false, false) => Self::SingleModern,
            (false, true) => Self::SingleLegacy,
            (true, false) => Self::CompositeModern,
            (true, true) => Self::CompositeLegacy,
        }
    }

    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::SingleLegacy | Self::CompositeLegacy)
    }

    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::CompositeModern | Self::CompositeLegacy)
    }
}

/// Capability ports a model run needs. The primitives stay pure over these.
#[derive(Clone, Copy)]
pub struct ModelServices<'a> {
    pub orchestrator: &'a dyn Orchestrator,
    pub policy: &'a dyn PolicyEngine,
    pub usage: &'a dyn UsageOracle,
}

#[derive(Debug, Clone)]
pub struct ContractState {
    pub contract: Contract,
    pub latest_valid: Option<SchemaVersionContract>,
}

/// Everything the publisher loaded before dispatching to a model.
#[derive(Debug, Clone)]
pub struct ModelContext {
    pub organization: Organization,
    pub project: Project,
    pub target: Target,
    pub latest_version: Option<SchemaVersion>,
    pub latest_composable_version: Option<SchemaVersion>,
    pub base_schema: Option<String>,
    pub approved_changes: BTreeMap<String, SchemaChangeApproval>,
    pub contracts: Vec<ContractState>,
    /// Diff baseline selection: latest when false, latest-composable when
    /// true.
    pub compare_to_previous_composable: bool,
}

impl ModelContext {
    #[must_use]
    pub fn baseline_version(&self) -> Option<&SchemaVersion> {
        if self.compare_to_previous_composable {
            self.latest_composable_version.as_ref()
        } else {
            self.latest_version.as_ref()
        }
    }

    #[must_use]
    pub const fn compare_to_latest(&self) -> bool {
        !self.compare_to_previous_composable
    }

    #[must_use]
    pub fn usage_selector(&self) -> UsageSelector {
        UsageSelector::new(
            self.target.id.clone(),
            self.target.validation_period_days,
            self.target.validation_percentage,
        )
    }

    #[must_use]
    pub fn composition_options(&self, with_contracts: bool) -> CompositionOptions {
        let contracts = (with_contracts && !self.contracts.is_empty()).then(|| {
            self.contracts
                .iter()
                .map(|state| ContractInput {
                    id: state.contract.id,
                    name: state.contract.contract_name.clone(),
                    filter: ContractFilter {
                        include_tags: state.contract.include_tags.clone(),
                        exclude_tags: state.contract.exclude_tags.clone(),
                        remove_unreachable_types_from_public_api_schema: state
                            .contract
                            .remove_unreachable_types_from_public_api_schema,
                    },
                })
                .collect()
        });
        CompositionOptions {
            external: self.project.external_composition.clone(),
            native: self.project.native_federation,
            contracts,
        }
    }

    /// Federation bookkeeping is filtered out of reported diffs on
    /// federation projects; old stored versions predate machinery
    /// stripping.
    #[must_use]
    pub fn filter_federation_changes(&self) -> bool {
        self.project.project_type == ProjectType::Federation
    }
}

#[derive(Debug, Clone)]
pub struct CheckModelInput {
    pub sdl: String,
    pub service_name: Option<String>,
    pub force: bool,
    pub experimental_accept_breaking_changes: bool,
}

#[derive(Debug, Clone)]
pub struct PublishModelInput {
    pub sdl: String,
    pub service_name: Option<String>,
    pub service_url: Option<String>,
    pub metadata: Option<String>,
    pub force: bool,
    pub experimental_accept_breaking_changes: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteModelInput {
    pub service_name: String,
}

/// Transport-level failures from the capability ports. Domain failures are
/// conclusions, never errors.
#[derive(Debug)]
#[non_exhaustive]
pub enum ModelError {
    Orchestrator(OrchestratorError),
    Policy(PolicyEngineError),
    Usage(UsageOracleError),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orchestrator(err) => write!(f, "{err}"),
            Self::Policy(err) => write!(f, "{err}"),
            Self::Usage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<OrchestratorError> for ModelError {
    fn from(value: OrchestratorError) -> Self {
        Self::Orchestrator(value)
    }
}

impl From<PolicyEngineError> for ModelError {
    fn from(value: PolicyEngineError) -> Self {
        Self::Policy(value)
    }
}

impl From<UsageOracleError> for ModelError {
    fn from(value: UsageOracleError) -> Self {
        Self::Usage(value)
    }
}

impl RegistryModel {
    pub async fn check(
        self,
        services: ModelServices<'_>,
        ctx: &ModelContext,
        input: &CheckModelInput,
    ) -> Result<SchemaCheckConclusion, ModelError> {
        match self {
            Self::SingleModern => single::check(services, ctx, input, false).await,
            Self::SingleLegacy => single::check(services, ctx, input, true).await,
            Self::CompositeModern => composite::check(services, ctx, input, false).await,
            Self::CompositeLegacy => composite::check(services, ctx, input, true).await,
        }
    }

    pub async fn publish(
        self,
        services: ModelServices<'_>,
        ctx: &ModelContext,
        input: &PublishModelInput,
    ) -> Result<SchemaPublishConclusion, ModelError> {
        match self {
            Self::SingleModern => single::publish(services, ctx, input, false).await,
            Self::SingleLegacy => single::publish(services, ctx, input, true).await,
            Self::CompositeModern => composite::publish(services, ctx, input, false).await,
            Self::CompositeLegacy => composite::publish(services, ctx, input, true).await,
        }
    }

    pub async fn delete(
        self,
        services: ModelServices<'_>,
        ctx: &ModelContext,
        input: &DeleteModelInput,
    ) -> Result<SchemaDeleteConclusion, ModelError> {
        match self {
            Self::CompositeModern => composite::delete(services, ctx, input, false).await,
            Self::CompositeLegacy => composite::delete(services, ctx, input, true).await,
            Self::SingleModern | Self::SingleLegacy => {
                Ok(SchemaDeleteConclusion::Reject {
                    reason: quiver_registry_model::DeleteRejectReason::UnknownServiceName {
                        given: input.service_name.clone(),
                    },
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_the_four_variants() {
        assert_eq!(
            RegistryModel::select(ProjectType::Single, false),
            RegistryModel::SingleModern
        );
        assert_eq!(
            RegistryModel::select(ProjectType::Single, true),
            RegistryModel::SingleLegacy
        );
        assert_eq!(
            RegistryModel::select(ProjectType::Federation, false),
            RegistryModel::CompositeModern
        );
        assert_eq!(
            RegistryModel::select(ProjectType::Stitching, true),
            RegistryModel::CompositeLegacy
        );
        assert!(RegistryModel::CompositeLegacy.is_legacy());
        assert!(!RegistryModel::SingleModern.is_composite());
    }
}

// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quiver_registry_model::{
    CompositionError, ContractId, ExternalCompositionConfig, ProjectType, ServiceSchema,
};

use crate::error::OrchestratorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ContractFilter {
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub remove_unreachable_types_from_public_api_schema: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractInput {
    pub id: ContractId,
    pub name: String,
    pub filter: ContractFilter,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositionOptions {
    /// Delegate composition to a user-controlled endpoint, signed with the
    /// project secret.
    pub external: Option<ExternalCompositionConfig>,
    /// Use the in-process composer even for federation projects.
    pub native: bool,
    pub contracts: Option<Vec<ContractInput>>,
}

/// Composition result for one contract input, parallel to the request list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCompositionOutcome {
    pub id: ContractId,
    pub name: String,
    pub sdl: Option<String>,
    pub supergraph: Option<String>,
    pub errors: Vec<CompositionError>,
}

/// What a composition backend answers. `errors` and `sdl` may both be
/// populated: old federation backends return the merged document together
/// with its validation errors, and consumers keep the SDL for diagnostics
/// while treating the version as non-composable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompositionOutcome {
    pub sdl: Option<String>,
    pub supergraph: Option<String>,
    pub tags: Option<Vec<String>>,
    pub errors: Vec<CompositionError>,
    pub contracts: Option<Vec<ContractCompositionOutcome>>,
}

impl CompositionOutcome {
    #[must_use]
    pub fn is_composable(&self) -> bool {
        self.errors.is_empty() && self.sdl.is_some()
    }
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn compose_and_validate(
        &self,
        project_type: ProjectType,
        schemas: &[ServiceSchema],
        options: &CompositionOptions,
    ) -> Result<CompositionOutcome, OrchestratorError>;
}

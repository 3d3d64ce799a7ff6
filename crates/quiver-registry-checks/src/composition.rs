// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use quiver_registry_compose::{
    CompositionOptions, CompositionOutcome, ContractCompositionOutcome, Orchestrator,
    OrchestratorError,
};
use quiver_registry_model::{
    CompositionError, CompositionErrorSource, ProjectType, ServiceSchema,
};

use crate::outcome::StageOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionCheckSuccess {
    pub composite_schema_sdl: String,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
    pub contracts: Option<Vec<ContractCompositionOutcome>>,
}

/// Composition failed validation. The SDL may still be present (legacy
/// backends emit errors and the merged document together); consumers keep it
/// for diagnostics but treat the version as non-composable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionCheckFailure {
    pub errors: Vec<CompositionError>,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    pub tags: Option<Vec<String>>,
    pub contracts: Option<Vec<ContractCompositionOutcome>>,
}

impl CompositionCheckFailure {
    #[must_use]
    pub fn graphql_errors(&self) -> Vec<&CompositionError> {
        self.errors
            .iter()
            .filter(|e| e.source == CompositionErrorSource::Graphql)
            .collect()
    }

    #[must_use]
    pub fn composition_errors(&self) -> Vec<&CompositionError> {
        self.errors
            .iter()
            .filter(|e| e.source == CompositionErrorSource::Composition)
            .collect()
    }
}

pub type CompositionCheckOutcome = StageOutcome<CompositionCheckSuccess, CompositionCheckFailure>;

/// Run composition through the orchestrator and fold the answer into a
/// stage outcome. Transport errors bubble out for the caller to retry.
pub async fn run_composition_check(
    orchestrator: &dyn Orchestrator,
    project_type: ProjectType,
    schemas: &[ServiceSchema],
    options: &CompositionOptions,
) -> Result<CompositionCheckOutcome, OrchestratorError> {
    let outcome = orchestrator
        .compose_and_validate(project_type, schemas, options)
        .await?;
    Ok(fold_outcome(outcome))
}

fn fold_outcome(outcome: CompositionOutcome) -> CompositionCheckOutcome {
    if outcome.errors.is_empty() {
        match outcome.sdl {
            Some(sdl) => StageOutcome::completed(CompositionCheckSuccess {
                composite_schema_sdl: sdl,
                supergraph_sdl: outcome.supergraph,
                tags: outcome.tags,
                contracts: outcome.contracts,
            }),
            // A backend that reports neither errors nor a document broke its
            // contract; surface it as a composition failure rather than a
            // phantom success.
            None => StageOutcome::failed(CompositionCheckFailure {
                errors: vec![CompositionError::composition(
                    "composition backend returned neither sdl nor errors",
                )],
                composite_schema_sdl: None,
                supergraph_sdl: None,
                tags: None,
                contracts: None,
            }),
        }
    } else {
        StageOutcome::failed(CompositionCheckFailure {
            errors: outcome.errors,
            composite_schema_sdl: outcome.sdl,
            supergraph_sdl: outcome.supergraph,
            tags: outcome.tags,
            contracts: outcome.contracts,
        })
    }
}

// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use quiver_registry_model::{ProjectType, ServiceSchema};

use crate::error::OrchestratorError;
use crate::external::ExternalComposer;
use crate::native::NativeComposer;
use crate::orchestrator::{CompositionOptions, CompositionOutcome, Orchestrator};

/// The production composer: delegates to the project's configured external
/// endpoint unless native composition is forced, and composes in-process
/// otherwise. Configuration mutations (enabling external composition,
/// toggling native federation) change behavior here on the next request,
/// with no pipeline rewiring.
#[derive(Debug, Clone, Default)]
pub struct DefaultOrchestrator {
    native: NativeComposer,
    external: ExternalComposer,
}

impl DefaultOrchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            native: NativeComposer::new(),
            external: ExternalComposer::new(),
        }
    }
}

#[async_trait]
impl Orchestrator for DefaultOrchestrator {
    async fn compose_and_validate(
        &self,
        project_type: ProjectType,
        schemas: &[ServiceSchema],
        options: &CompositionOptions,
    ) -> Result<CompositionOutcome, OrchestratorError> {
        if options.external.is_some() && !options.native {
            self.external
                .compose_and_validate(project_type, schemas, options)
                .await
        } else {
            self.native
                .compose_and_validate(project_type, schemas, options)
                .await
        }
    }
}

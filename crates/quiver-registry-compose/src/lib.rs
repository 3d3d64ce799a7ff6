#![forbid(unsafe_code)]
//! Composition backends for the registry. One port, three executions:
//! in-process single-document validation, in-process subgraph merging for
//! federation and stitching projects, and delegation to a user-controlled
//! HTTP composer.

mod contracts;
mod error;
mod external;
mod federation;
mod native;
mod orchestrator;
mod router;

pub use contracts::apply_contract_filter;
pub use error::OrchestratorError;
pub use external::{sign_body, ExternalComposer, SIGNATURE_HEADER};
pub use federation::{
    collect_tags, is_federation_directive_name, is_federation_type_name,
    strip_federation_elements, FEDERATION_DIRECTIVE_TOKENS, FEDERATION_ROOT_FIELDS,
    FEDERATION_TYPE_NAMES,
};
pub use native::NativeComposer;
pub use router::DefaultOrchestrator;
pub use orchestrator::{
    CompositionOptions, CompositionOutcome, ContractCompositionOutcome, ContractFilter,
    ContractInput, Orchestrator,
};

pub const CRATE_NAME: &str = "quiver-registry-compose";

#![forbid(unsafe_code)]
//! Registry model SSOT: every record that crosses a subsystem boundary —
//! targets, schema log entries, versions, changes, checks, contracts,
//! approvals, and the conclusion sum types — is defined here once.

mod approval;
mod change;
mod check;
mod conclusion;
mod contract;
mod error;
mod ids;
mod log;
mod target;
mod version;

pub use approval::SchemaChangeApproval;
pub use change::{ChangeApprovalMetadata, ChangeSeverity, SchemaChange, SchemaChangeType};
pub use check::{
    GitHubIntegrationMetadata, PolicySeverity, SchemaCheck, SchemaPolicyIssue,
};
pub use conclusion::{
    CompositionSuccessState, DeleteRejectReason, PublishIgnoreReason, PublishRejectReason,
    SchemaCheckConclusion, SchemaCheckFailureState, SchemaCheckSuccessState,
    SchemaDeleteConclusion, SchemaDeleteState, SchemaPublishConclusion, SchemaPublishState,
};
pub use contract::{Contract, ContractCheckResult, ContractPublishState, SchemaVersionContract};
pub use error::ValidationError;
pub use ids::{
    ContextId, ContractId, ContractVersionId, OrganizationId, ProjectId, SchemaCheckId,
    SchemaLogId, SchemaVersionId, TargetId, CONTEXT_ID_MAX_LEN, SLUG_MAX_LEN,
};
pub use log::{
    swap_services, to_service_schemas, DeletedSchema, PushedSchema, SchemaLogEntry, ServiceSchema,
};
pub use target::{ExternalCompositionConfig, Organization, Project, ProjectType, Target};
pub use version::{CompositionError, CompositionErrorSource, SchemaVersion};

pub const CRATE_NAME: &str = "quiver-registry-model";

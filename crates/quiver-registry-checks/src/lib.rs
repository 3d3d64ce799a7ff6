#![forbid(unsafe_code)]
//! The reusable check primitives the project models sequence into
//! conclusions. Every primitive answers `Completed`, `Failed`, or
//! `Skipped`; the reducers upstream pattern-match on those tags.

mod approvals;
mod checksum;
mod composition;
mod diff;
mod federation_filter;
mod outcome;
mod policy;
mod service;
mod url_changes;

pub use approvals::apply_approved_changes;
pub use checksum::{run_checksum_check, schema_set_checksum, ChecksumResult};
pub use composition::{
    run_composition_check, CompositionCheckFailure, CompositionCheckOutcome,
    CompositionCheckSuccess,
};
pub use diff::{run_diff_check, DiffCheckInput, DiffCheckOutcome, SchemaDiffState};
pub use federation_filter::filter_out_federation_changes;
pub use outcome::StageOutcome;
pub use policy::{
    run_policy_check, PolicyCheckFailure, PolicyCheckOutcome, PolicyCheckSuccess,
};
pub use service::{
    run_metadata_check, run_service_name_check, run_service_url_check, MetadataFailure,
    MetadataResult, ServiceNameFailure, ServiceUrlFailure, ServiceUrlResult,
};
pub use url_changes::detect_url_changes;

pub const CRATE_NAME: &str = "quiver-registry-checks";

#![forbid(unsafe_code)]
//! The inspector: a classified structural diff between two composed
//! documents, with breaking changes cross-checked against real traffic.

mod diff;
mod severity;
mod usage;

pub use diff::{diff_documents, diff_schemas};
pub use severity::{is_required_input, is_safe_input_type_change, is_safe_output_type_change};
pub use usage::{NoUsageOracle, StaticUsageOracle, UsageOracle, UsageOracleError, UsageSelector};

pub const CRATE_NAME: &str = "quiver-registry-inspect";

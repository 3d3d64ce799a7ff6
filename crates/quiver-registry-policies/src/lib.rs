#![forbid(unsafe_code)]
//! Policy evaluation over composed schemas: a port for external policy
//! services plus the built-in rule-table engine.

mod engine;
mod rules;

pub use engine::{NoopPolicyEngine, PolicyEngine, PolicyEngineError, PolicyOutcome};
pub use rules::RulePolicyEngine;

pub const CRATE_NAME: &str = "quiver-registry-policies";

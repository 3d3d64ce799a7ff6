// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quiver_registry_model::TargetId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageOracleError(pub String);

impl fmt::Display for UsageOracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usage oracle error: {}", self.0)
    }
}

impl std::error::Error for UsageOracleError {}

/// Scope of a usage lookup: which target's traffic, how far back, and the
/// request share under which a coordinate still counts as unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSelector {
    pub target_id: TargetId,
    pub period_days: u16,
    pub percentage_threshold: f64,
}

impl UsageSelector {
    #[must_use]
    pub fn new(target_id: TargetId, period_days: u16, percentage_threshold: f64) -> Self {
        Self {
            target_id,
            period_days,
            percentage_threshold,
        }
    }
}

/// Answers "which of these schema coordinates saw no traffic in the
/// window". Only breaking changes are ever looked up.
#[async_trait]
pub trait UsageOracle: Send + Sync {
    async fn unused_coordinates(
        &self,
        selector: &UsageSelector,
        coordinates: &[String],
    ) -> Result<BTreeSet<String>, UsageOracleError>;
}

/// Oracle for deployments without usage reporting: every coordinate counts
/// as used, so no breaking change is downgraded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsageOracle;

#[async_trait]
impl UsageOracle for NoUsageOracle {
    async fn unused_coordinates(
        &self,
        _selector: &UsageSelector,
        _coordinates: &[String],
    ) -> Result<BTreeSet<String>, UsageOracleError> {
        Ok(BTreeSet::new())
    }
}

/// Fixed-answer oracle for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticUsageOracle {
    unused: BTreeSet<String>,
}

impl StaticUsageOracle {
    #[must_use]
    pub fn new(unused: impl IntoIterator<Item = String>) -> Self {
        Self {
            unused: unused.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UsageOracle for StaticUsageOracle {
    async fn unused_coordinates(
        &self,
        _selector: &UsageSelector,
        coordinates: &[String],
    ) -> Result<BTreeSet<String>, UsageOracleError> {
        Ok(coordinates
            .iter()
            .filter(|c| self.unused.contains(*c))
            .cloned()
            .collect())
    }
}

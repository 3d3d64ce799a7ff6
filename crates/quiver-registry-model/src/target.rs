// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::{OrganizationId, ProjectId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ProjectType {
    Single,
    Federation,
    Stitching,
}

impl ProjectType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Federation => "federation",
            Self::Stitching => "stitching",
        }
    }

    /// Composite projects version a set of named services rather than one
    /// monolithic document.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::Federation | Self::Stitching)
    }

    #[must_use]
    pub const fn supports_contracts(self) -> bool {
        matches!(self, Self::Federation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Organization {
    pub id: OrganizationId,
    /// How many days a failed or passing check is retained before the purge
    /// worker removes it.
    pub check_retention_days: u16,
}

impl Organization {
    #[must_use]
    pub fn new(id: OrganizationId, check_retention_days: u16) -> Self {
        Self {
            id,
            check_retention_days,
        }
    }
}

/// Delegated composition endpoint configured per project. Requests to it are
/// signed with the shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalCompositionConfig {
    pub endpoint: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub id: ProjectId,
    pub org_id: OrganizationId,
    pub project_type: ProjectType,
    /// Old registry behavior: breaking changes accepted with `force`, no
    /// policy checks, no contracts.
    pub legacy_registry_model: bool,
    /// Diff baseline selection: latest version when false, the nearest
    /// composable ancestor when true.
    pub compare_to_previous_composable_version: bool,
    pub external_composition: Option<ExternalCompositionConfig>,
    pub native_federation: bool,
    pub git_repository: Option<String>,
}

impl Project {
    #[must_use]
    pub fn new(id: ProjectId, org_id: OrganizationId, project_type: ProjectType) -> Self {
        Self {
            id,
            org_id,
            project_type,
            legacy_registry_model: false,
            compare_to_previous_composable_version: false,
            external_composition: None,
            native_federation: false,
            git_repository: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub id: TargetId,
    pub project_id: ProjectId,
    pub org_id: OrganizationId,
    /// Window, in days, the usage oracle considers when deciding whether a
    /// breaking change is safe based on traffic.
    pub validation_period_days: u16,
    /// Requests-per-period below which a coordinate counts as unused.
    pub validation_percentage: f64,
}

impl Target {
    #[must_use]
    pub fn new(id: TargetId, project_id: ProjectId, org_id: OrganizationId) -> Self {
        Self {
            id,
            project_id,
            org_id,
            validation_period_days: 30,
            validation_percentage: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_type_shape() {
        assert!(!ProjectType::Single.is_composite());
        assert!(ProjectType::Federation.is_composite());
        assert!(ProjectType::Stitching.is_composite());
        assert!(ProjectType::Federation.supports_contracts());
        assert!(!ProjectType::Stitching.supports_contracts());
    }
}

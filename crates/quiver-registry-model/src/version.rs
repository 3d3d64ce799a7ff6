// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PushedSchema, SchemaLogId, SchemaVersionId, TargetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CompositionErrorSource {
    Graphql,
    Composition,
}

impl CompositionErrorSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graphql => "graphql",
            Self::Composition => "composition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompositionError {
    pub message: String,
    pub source: CompositionErrorSource,
}

impl CompositionError {
    #[must_use]
    pub fn graphql(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: CompositionErrorSource::Graphql,
        }
    }

    #[must_use]
    pub fn composition(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: CompositionErrorSource::Composition,
        }
    }
}

/// An immutable snapshot of a target. `previous_schema_version_id` forms the
/// lineage chain; the active log set is the previous set with the version's
/// own log entry applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: SchemaVersionId,
    pub target_id: TargetId,
    pub created_at: DateTime<Utc>,
    pub is_composable: bool,
    pub previous_schema_version_id: Option<SchemaVersionId>,
    pub base_schema: Option<String>,
    pub composite_schema_sdl: Option<String>,
    pub supergraph_sdl: Option<String>,
    /// Non-null exactly when the version is composable and the project
    /// supports contracts.
    pub tags: Option<Vec<String>>,
    pub schema_composition_errors: Option<Vec<CompositionError>>,
    /// Log entry ids recorded for this version (the incoming action).
    pub log_ids: Vec<SchemaLogId>,
    /// The resolved active push set at this version.
    pub schemas: Vec<PushedSchema>,
}

impl SchemaVersion {
    /// A non-composed version must carry no supergraph and at least one
    /// composition error; a composed one must carry the SDL.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.composite_schema_sdl.is_none() {
            if self.supergraph_sdl.is_some() {
                return Err("supergraph_sdl must be null when composite_schema_sdl is null");
            }
            match &self.schema_composition_errors {
                Some(errors) if !errors.is_empty() => {}
                _ => {
                    return Err(
                        "schema_composition_errors must be non-empty when composite_schema_sdl is null",
                    )
                }
            }
        }
        let mut names: Vec<&str> = self.schemas.iter().map(|s| s.service_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.schemas.len() {
            return Err("active log set contains duplicate service names");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version() -> SchemaVersion {
        SchemaVersion {
            id: SchemaVersionId::generate(),
            target_id: TargetId::new("staging").expect("target id"),
            created_at: Utc::now(),
            is_composable: true,
            previous_schema_version_id: None,
            base_schema: None,
            composite_schema_sdl: Some("type Query { ok: Boolean }".to_string()),
            supergraph_sdl: None,
            tags: None,
            schema_composition_errors: None,
            log_ids: Vec::new(),
            schemas: Vec::new(),
        }
    }

    #[test]
    fn null_sdl_requires_errors_and_no_supergraph() {
        let mut v = version();
        v.composite_schema_sdl = None;
        assert!(v.validate().is_err());

        v.schema_composition_errors = Some(vec![CompositionError::composition("boom")]);
        assert!(v.validate().is_ok());

        v.supergraph_sdl = Some("supergraph".to_string());
        assert!(v.validate().is_err());
    }

    #[test]
    fn duplicate_service_names_are_invalid() {
        let mut v = version();
        let push = PushedSchema {
            id: SchemaLogId::generate(),
            sdl: "type Query { ok: Boolean }".to_string(),
            service_name: "users".to_string(),
            service_url: None,
            metadata: None,
            author: "a".to_string(),
            commit: "c".to_string(),
        };
        v.schemas = vec![push.clone(), push];
        assert!(v.validate().is_err());
    }
}

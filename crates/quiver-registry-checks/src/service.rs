// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::outcome::StageOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ServiceNameFailure {
    Missing,
}

/// Composite operations address a service by name; an absent or empty name
/// cannot be resolved against the registered set.
#[must_use]
pub fn run_service_name_check(name: Option<&str>) -> StageOutcome<String, ServiceNameFailure> {
    match name {
        Some(name) if !name.trim().is_empty() => StageOutcome::completed(name.to_string()),
        _ => StageOutcome::failed(ServiceNameFailure::Missing),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "comparison", rename_all = "snake_case")]
pub enum ServiceUrlResult {
    Unchanged { url: String },
    Modified { url: String, previous: Option<String> },
}

impl ServiceUrlResult {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Unchanged { url } | Self::Modified { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ServiceUrlFailure {
    Missing,
    Invalid { given: String },
}

#[must_use]
pub fn run_service_url_check(
    url: Option<&str>,
    existing_url: Option<&str>,
) -> StageOutcome<ServiceUrlResult, ServiceUrlFailure> {
    let Some(url) = url else {
        return StageOutcome::failed(ServiceUrlFailure::Missing);
    };
    if url.trim().is_empty() {
        return StageOutcome::failed(ServiceUrlFailure::Missing);
    }
    if Url::parse(url).is_err() {
        return StageOutcome::failed(ServiceUrlFailure::Invalid {
            given: url.to_string(),
        });
    }
    match existing_url {
        Some(existing) if existing == url => StageOutcome::completed(ServiceUrlResult::Unchanged {
            url: url.to_string(),
        }),
        _ => StageOutcome::completed(ServiceUrlResult::Modified {
            url: url.to_string(),
            previous: existing_url.map(str::to_string),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "comparison", rename_all = "snake_case")]
pub enum MetadataResult {
    Unchanged { metadata: Value },
    Modified { metadata: Value },
}

impl MetadataResult {
    #[must_use]
    pub fn metadata(&self) -> &Value {
        match self {
            Self::Unchanged { metadata } | Self::Modified { metadata } => metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum MetadataFailure {
    ParsingFailure { message: String },
}

/// Metadata arrives as raw JSON text from the client. Skips when none was
/// supplied; fails when it does not parse.
#[must_use]
pub fn run_metadata_check(
    raw: Option<&str>,
    existing: Option<&Value>,
) -> StageOutcome<MetadataResult, MetadataFailure> {
    let Some(raw) = raw else {
        return StageOutcome::Skipped;
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(metadata) => {
            if existing == Some(&metadata) {
                StageOutcome::completed(MetadataResult::Unchanged { metadata })
            } else {
                StageOutcome::completed(MetadataResult::Modified { metadata })
            }
        }
        Err(error) => StageOutcome::failed(MetadataFailure::ParsingFailure {
            message: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_must_be_non_empty() {
        assert!(run_service_name_check(Some("users")).is_completed());
        assert!(run_service_name_check(Some("  ")).is_failed());
        assert!(run_service_name_check(None).is_failed());
    }

    #[test]
    fn service_url_validates_and_compares() {
        let unchanged = run_service_url_check(Some("https://u"), Some("https://u"));
        assert!(matches!(
            unchanged.completed_ref(),
            Some(ServiceUrlResult::Unchanged { .. })
        ));

        let modified = run_service_url_check(Some("https://b"), Some("https://a"));
        match modified.completed_ref().expect("completed") {
            ServiceUrlResult::Modified { url, previous } => {
                assert_eq!(url, "https://b");
                assert_eq!(previous.as_deref(), Some("https://a"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(run_service_url_check(Some("not a url"), None).is_failed());
        assert!(run_service_url_check(None, None).is_failed());
    }

    #[test]
    fn metadata_parses_or_fails_or_skips() {
        assert!(run_metadata_check(None, None).is_skipped());
        assert!(run_metadata_check(Some("{\"team\":\"identity\"}"), None).is_completed());
        assert!(run_metadata_check(Some("{not json"), None).is_failed());

        let existing = serde_json::json!({"team": "identity"});
        let unchanged = run_metadata_check(Some("{\"team\":\"identity\"}"), Some(&existing));
        assert!(matches!(
            unchanged.completed_ref(),
            Some(MetadataResult::Unchanged { .. })
        ));
    }
}

// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use quiver_registry_core::{canonicalize_schema_set, SchemaPart};
use quiver_registry_model::ServiceSchema;

/// How the incoming canonical form relates to the registered baseline. The
/// checksum stage never fails and never skips; a missing baseline is the
/// `Initial` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "comparison", rename_all = "snake_case")]
pub enum ChecksumResult {
    Initial { checksum: String },
    Unchanged { checksum: String },
    Modified { checksum: String, previous: String },
}

impl ChecksumResult {
    #[must_use]
    pub fn checksum(&self) -> &str {
        match self {
            Self::Initial { checksum }
            | Self::Unchanged { checksum }
            | Self::Modified { checksum, .. } => checksum,
        }
    }

    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }
}

#[must_use]
pub fn run_checksum_check(
    incoming: &[ServiceSchema],
    base_schema: Option<&str>,
    baseline: Option<&[ServiceSchema]>,
    baseline_base_schema: Option<&str>,
) -> ChecksumResult {
    let checksum = schema_set_checksum(incoming, base_schema);
    match baseline {
        None => ChecksumResult::Initial { checksum },
        Some(previous_set) => {
            let previous = schema_set_checksum(previous_set, baseline_base_schema);
            if previous == checksum {
                ChecksumResult::Unchanged { checksum }
            } else {
                ChecksumResult::Modified {
                    checksum,
                    previous,
                }
            }
        }
    }
}

#[must_use]
pub fn schema_set_checksum(schemas: &[ServiceSchema], base_schema: Option<&str>) -> String {
    let parts: Vec<SchemaPart<'_>> = schemas
        .iter()
        .map(|s| SchemaPart::new(&s.name, &s.sdl, s.url.as_deref()))
        .collect();
    canonicalize_schema_set(&parts, base_schema).checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, sdl: &str, url: Option<&str>) -> ServiceSchema {
        ServiceSchema::new(name, sdl, url.map(str::to_string))
    }

    #[test]
    fn no_baseline_is_initial() {
        let result = run_checksum_check(
            &[service("users", "type Query { me: String }", None)],
            None,
            None,
            None,
        );
        assert!(matches!(result, ChecksumResult::Initial { .. }));
    }

    #[test]
    fn formatting_only_difference_is_unchanged() {
        let incoming = [service("users", "type Query{me:String}", None)];
        let baseline = [service("users", "type Query {\n  me: String\n}", None)];
        let result = run_checksum_check(&incoming, None, Some(&baseline), None);
        assert!(result.is_unchanged());
    }

    #[test]
    fn url_difference_is_modified() {
        let incoming = [service("users", "type Query { me: String }", Some("https://b"))];
        let baseline = [service("users", "type Query { me: String }", Some("https://a"))];
        let result = run_checksum_check(&incoming, None, Some(&baseline), None);
        assert!(matches!(result, ChecksumResult::Modified { .. }));
    }

    #[test]
    fn baseline_order_does_not_matter() {
        let incoming = [
            service("a", "type A { x: Int }", None),
            service("b", "type B { y: Int }", None),
        ];
        let baseline = [
            service("b", "type B { y: Int }", None),
            service("a", "type A { x: Int }", None),
        ];
        let result = run_checksum_check(&incoming, None, Some(&baseline), None);
        assert!(result.is_unchanged());
    }
}

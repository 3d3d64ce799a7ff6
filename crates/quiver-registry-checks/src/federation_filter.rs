// SPDX-License-Identifier: Apache-2.0

use quiver_registry_compose::{FEDERATION_DIRECTIVE_TOKENS, FEDERATION_TYPE_NAMES};
use quiver_registry_model::SchemaChange;

/// Drop changes whose path touches federation machinery. Versions composed
/// before machinery stripping existed leak `_entities`, `join__*` and
/// friends into the stored SDL; diffing against them would otherwise report
/// bookkeeping churn to the user.
#[must_use]
pub fn filter_out_federation_changes(changes: Vec<SchemaChange>) -> Vec<SchemaChange> {
    changes
        .into_iter()
        .filter(|change| !references_federation_machinery(change))
        .collect()
}

fn references_federation_machinery(change: &SchemaChange) -> bool {
    let Some(path) = change.path.as_deref() else {
        return false;
    };
    if path.starts_with('@') {
        return FEDERATION_DIRECTIVE_TOKENS.contains(&path)
            || path.starts_with("@join__")
            || path.starts_with("@link__")
            || path.starts_with("@federation__");
    }
    path.split('.').any(|segment| {
        FEDERATION_TYPE_NAMES.contains(&segment)
            || segment.starts_with("join__")
            || segment.starts_with("link__")
            || segment.starts_with("federation__")
            || segment == "_entities"
            || segment == "_service"
    })
}

// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use quiver_registry_core::stable_json_hash_hex;
use quiver_registry_model::{
    ChangeSeverity, SchemaChange, SchemaChangeType, ServiceSchema,
};

/// One synthetic change per service registered on both sides whose URL
/// differs. Output is keyed and ordered by service name, so input ordering
/// never shows through. Services appearing on only one side are push/delete
/// traffic, not URL moves.
#[must_use]
pub fn detect_url_changes(
    subgraphs_before: &[ServiceSchema],
    subgraphs_after: &[ServiceSchema],
) -> Vec<SchemaChange> {
    if subgraphs_before.is_empty() {
        return Vec::new();
    }

    let before: BTreeMap<&str, Option<&str>> = subgraphs_before
        .iter()
        .map(|s| (s.name.as_str(), s.url.as_deref()))
        .collect();

    let mut changes = Vec::new();
    let mut after: Vec<&ServiceSchema> = subgraphs_after.iter().collect();
    after.sort_by(|a, b| a.name.cmp(&b.name));

    for service in after {
        let Some(old_url) = before.get(service.name.as_str()) else {
            continue;
        };
        let new_url = service.url.as_deref();
        if *old_url == new_url {
            continue;
        }
        let meta: BTreeMap<String, String> = BTreeMap::from([
            ("service_name".to_string(), service.name.clone()),
            ("old".to_string(), old_url.unwrap_or("").to_string()),
            ("new".to_string(), new_url.unwrap_or("").to_string()),
        ]);
        let id = stable_json_hash_hex(&SchemaChange::identity_material(
            SchemaChangeType::RegistryServiceUrlChanged,
            &meta,
        ))
        .unwrap_or_default();
        changes.push(SchemaChange {
            id,
            change_type: SchemaChangeType::RegistryServiceUrlChanged,
            severity: ChangeSeverity::Safe,
            message: format!(
                "[{}] New service url: '{}' (previously: '{}')",
                service.name,
                new_url.unwrap_or("none"),
                old_url.unwrap_or("none"),
            ),
            path: None,
            meta,
            is_safe_based_on_usage: false,
            approval: None,
        });
    }

    changes
}

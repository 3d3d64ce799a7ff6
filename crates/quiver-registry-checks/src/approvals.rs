// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use quiver_registry_model::{SchemaChange, SchemaChangeApproval};

/// Replace detected breaking changes with their stored approval snapshots.
/// The snapshot wins wholesale so the original approver identity and
/// timestamp survive re-detection; non-breaking changes are never touched.
pub fn apply_approved_changes(
    changes: &mut [SchemaChange],
    approved: &BTreeMap<String, SchemaChangeApproval>,
) {
    if approved.is_empty() {
        return;
    }
    for change in changes.iter_mut() {
        if !change.is_breaking() {
            continue;
        }
        if let Some(approval) = approved.get(&change.id) {
            *change = approval.change.clone();
        }
    }
}

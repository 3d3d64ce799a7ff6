// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContextId, SchemaChange, TargetId};

/// A breaking change approved under a context id. Keyed by
/// `(target_id, context_id, schema_change_id)`; later checks in the same
/// context replace a matching detected change with this snapshot. Approvals
/// outlive the check they were granted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChangeApproval {
    pub target_id: TargetId,
    pub context_id: ContextId,
    pub schema_change_id: String,
    pub change: SchemaChange,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quiver_registry_model::{CompositionError, SchemaChange, SchemaVersionId, TargetId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertsError(pub String);

impl fmt::Display for AlertsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alerts error: {}", self.0)
    }
}

impl std::error::Error for AlertsError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChangeNotification {
    pub target_id: TargetId,
    pub schema_version_id: SchemaVersionId,
    pub initial: bool,
    pub changes: Vec<SchemaChange>,
    pub composition_errors: Vec<CompositionError>,
}

/// Outbound change-notification fan-out. Fired after the transaction
/// commits; failures are logged by the caller and never surfaced.
#[async_trait]
pub trait AlertsPort: Send + Sync {
    async fn notify_schema_change(
        &self,
        notification: SchemaChangeNotification,
    ) -> Result<(), AlertsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlerts;

#[async_trait]
impl AlertsPort for NoopAlerts {
    async fn notify_schema_change(
        &self,
        _notification: SchemaChangeNotification,
    ) -> Result<(), AlertsError> {
        Ok(())
    }
}

/// Captures notifications for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    notifications: Mutex<Vec<SchemaChangeNotification>>,
}

impl RecordingAlerts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn drain(&self) -> Vec<SchemaChangeNotification> {
        self.notifications
            .lock()
            .map(|mut n| n.drain(..).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AlertsPort for RecordingAlerts {
    async fn notify_schema_change(
        &self,
        notification: SchemaChangeNotification,
    ) -> Result<(), AlertsError> {
        self.notifications
            .lock()
            .map_err(|_| AlertsError("poisoned alert sink".to_string()))?
            .push(notification);
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ChangeSeverity {
    Breaking,
    Dangerous,
    Safe,
}

impl ChangeSeverity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breaking => "breaking",
            Self::Dangerous => "dangerous",
            Self::Safe => "safe",
        }
    }
}

/// User-visible change codes. The string form is part of the stored and
/// reported surface, so the variants render in SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum SchemaChangeType {
    TypeRemoved,
    TypeAdded,
    TypeKindChanged,
    TypeDescriptionChanged,
    FieldRemoved,
    FieldAdded,
    FieldTypeChanged,
    FieldDeprecationAdded,
    FieldDeprecationRemoved,
    FieldArgumentAdded,
    FieldArgumentRemoved,
    FieldArgumentTypeChanged,
    FieldArgumentDefaultChanged,
    EnumValueRemoved,
    EnumValueAdded,
    UnionMemberRemoved,
    UnionMemberAdded,
    InputFieldRemoved,
    InputFieldAdded,
    InputFieldTypeChanged,
    InputFieldDefaultChanged,
    ObjectTypeInterfaceAdded,
    ObjectTypeInterfaceRemoved,
    DirectiveRemoved,
    DirectiveAdded,
    RegistryServiceUrlChanged,
}

impl SchemaChangeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TypeRemoved => "TYPE_REMOVED",
            Self::TypeAdded => "TYPE_ADDED",
            Self::TypeKindChanged => "TYPE_KIND_CHANGED",
            Self::TypeDescriptionChanged => "TYPE_DESCRIPTION_CHANGED",
            Self::FieldRemoved => "FIELD_REMOVED",
            Self::FieldAdded => "FIELD_ADDED",
            Self::FieldTypeChanged => "FIELD_TYPE_CHANGED",
            Self::FieldDeprecationAdded => "FIELD_DEPRECATION_ADDED",
            Self::FieldDeprecationRemoved => "FIELD_DEPRECATION_REMOVED",
            Self::FieldArgumentAdded => "FIELD_ARGUMENT_ADDED",
            Self::FieldArgumentRemoved => "FIELD_ARGUMENT_REMOVED",
            Self::FieldArgumentTypeChanged => "FIELD_ARGUMENT_TYPE_CHANGED",
            Self::FieldArgumentDefaultChanged => "FIELD_ARGUMENT_DEFAULT_CHANGED",
            Self::EnumValueRemoved => "ENUM_VALUE_REMOVED",
            Self::EnumValueAdded => "ENUM_VALUE_ADDED",
            Self::UnionMemberRemoved => "UNION_MEMBER_REMOVED",
            Self::UnionMemberAdded => "UNION_MEMBER_ADDED",
            Self::InputFieldRemoved => "INPUT_FIELD_REMOVED",
            Self::InputFieldAdded => "INPUT_FIELD_ADDED",
            Self::InputFieldTypeChanged => "INPUT_FIELD_TYPE_CHANGED",
            Self::InputFieldDefaultChanged => "INPUT_FIELD_DEFAULT_CHANGED",
            Self::ObjectTypeInterfaceAdded => "OBJECT_TYPE_INTERFACE_ADDED",
            Self::ObjectTypeInterfaceRemoved => "OBJECT_TYPE_INTERFACE_REMOVED",
            Self::DirectiveRemoved => "DIRECTIVE_REMOVED",
            Self::DirectiveAdded => "DIRECTIVE_ADDED",
            Self::RegistryServiceUrlChanged => "REGISTRY_SERVICE_URL_CHANGED",
        }
    }
}

/// Who approved a breaking change and under which check context. Carried on
/// the change wherever it is reported so the original approver survives
/// re-checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeApprovalMetadata {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub schema_check_id: crate::SchemaCheckId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaChange {
    /// Deterministic hash of `(type, meta)`; equal changes across runs and
    /// machines share an id.
    pub id: String,
    pub change_type: SchemaChangeType,
    pub severity: ChangeSeverity,
    pub message: String,
    /// Dotted schema coordinate the change anchors to, e.g. `Query.me`.
    pub path: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub is_safe_based_on_usage: bool,
    pub approval: Option<ChangeApprovalMetadata>,
}

impl SchemaChange {
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        self.severity == ChangeSeverity::Breaking
    }

    /// A breaking change does not block a check when traffic says the
    /// coordinate is unused or when an approval snapshot was applied.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.is_breaking() && !self.is_safe_based_on_usage && self.approval.is_none()
    }

    /// The serializable material the deterministic id is derived from.
    #[must_use]
    pub fn identity_material(
        change_type: SchemaChangeType,
        meta: &BTreeMap<String, String>,
    ) -> (&'static str, &BTreeMap<String, String>) {
        (change_type.as_str(), meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(severity: ChangeSeverity) -> SchemaChange {
        SchemaChange {
            id: "abc".to_string(),
            change_type: SchemaChangeType::FieldRemoved,
            severity,
            message: "Field `Query.me` was removed".to_string(),
            path: Some("Query.me".to_string()),
            meta: BTreeMap::new(),
            is_safe_based_on_usage: false,
            approval: None,
        }
    }

    #[test]
    fn blocking_requires_breaking_without_relief() {
        assert!(change(ChangeSeverity::Breaking).is_blocking());
        assert!(!change(ChangeSeverity::Dangerous).is_blocking());
        assert!(!change(ChangeSeverity::Safe).is_blocking());

        let mut usage_safe = change(ChangeSeverity::Breaking);
        usage_safe.is_safe_based_on_usage = true;
        assert!(!usage_safe.is_blocking());
    }

    #[test]
    fn change_type_codes_are_screaming_snake() {
        let encoded =
            serde_json::to_string(&SchemaChangeType::FieldTypeChanged).expect("serialize");
        assert_eq!(encoded, "\"FIELD_TYPE_CHANGED\"");
        assert_eq!(
            SchemaChangeType::RegistryServiceUrlChanged.as_str(),
            "REGISTRY_SERVICE_URL_CHANGED"
        );
    }
}

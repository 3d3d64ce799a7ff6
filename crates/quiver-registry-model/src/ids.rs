// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ValidationError;

pub const SLUG_MAX_LEN: usize = 64;
pub const CONTEXT_ID_MAX_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationId(String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId(String);

/// Groups related checks so that an approval granted on one applies to the
/// ones that follow it. Typically `repo#pr_number`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContextId(String);

impl OrganizationId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_slug("organization_id", &value)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ProjectId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_slug("project_id", &value)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TargetId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        validate_slug("target_id", &value)?;
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ContextId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::new(
                "context_id",
                value,
                "must not be empty",
            ));
        }
        if value.len() > CONTEXT_ID_MAX_LEN {
            return Err(ValidationError::new(
                "context_id",
                value,
                "must be at most 200 characters",
            ));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_slug(kind: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(kind, value, "must not be empty"));
    }
    if value.len() > SLUG_MAX_LEN {
        return Err(ValidationError::new(
            kind,
            value,
            "must be at most 64 characters",
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ValidationError::new(
            kind,
            value,
            "must contain only [a-z0-9_-]",
        ));
    }
    Ok(())
}

macro_rules! impl_slug_id_traits {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, ValidationError> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValidationError;

            fn try_from(value: &str) -> Result<Self, ValidationError> {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, ValidationError> {
                Self::new(s)
            }
        }
    };
}

impl_slug_id_traits!(OrganizationId);
impl_slug_id_traits!(ProjectId);
impl_slug_id_traits!(TargetId);
impl_slug_id_traits!(ContextId);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub const fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(SchemaVersionId);
uuid_id!(SchemaCheckId);
uuid_id!(SchemaLogId);
uuid_id!(ContractId);
uuid_id!(ContractVersionId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_ids_are_strict() {
        assert!(TargetId::new("staging").is_ok());
        assert!(TargetId::new("my-target_01").is_ok());
        assert!(TargetId::new("").is_err());
        assert!(TargetId::new("Staging").is_err());
        assert!(TargetId::new("has space").is_err());
        assert!(TargetId::new("t".repeat(SLUG_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn context_id_length_bounds() {
        assert!(ContextId::new("acme/console#42").is_ok());
        assert!(ContextId::new("").is_err());
        assert!(ContextId::new("c".repeat(CONTEXT_ID_MAX_LEN)).is_ok());
        assert!(ContextId::new("c".repeat(CONTEXT_ID_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn uuid_ids_round_trip_through_display() {
        let id = SchemaVersionId::generate();
        let parsed: SchemaVersionId = id.to_string().parse().expect("parse");
        assert_eq!(id, parsed);
    }
}

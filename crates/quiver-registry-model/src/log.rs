// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SchemaLogId;

/// A named service document as it participates in composition. For single
/// projects the set always contains exactly one entry whose name is the
/// project id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSchema {
    pub name: String,
    pub sdl: String,
    pub url: Option<String>,
}

impl ServiceSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, sdl: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            sdl: sdl.into(),
            url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushedSchema {
    pub id: SchemaLogId,
    pub sdl: String,
    pub service_name: String,
    pub service_url: Option<String>,
    pub metadata: Option<Value>,
    pub author: String,
    pub commit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeletedSchema {
    pub id: SchemaLogId,
    pub service_name: String,
    pub author: Option<String>,
}

/// One immutable append-only record per user action on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SchemaLogEntry {
    Push(PushedSchema),
    Delete(DeletedSchema),
}

impl SchemaLogEntry {
    #[must_use]
    pub fn id(&self) -> SchemaLogId {
        match self {
            Self::Push(push) => push.id,
            Self::Delete(delete) => delete.id,
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        match self {
            Self::Push(push) => &push.service_name,
            Self::Delete(delete) => &delete.service_name,
        }
    }

    #[must_use]
    pub fn as_push(&self) -> Option<&PushedSchema> {
        match self {
            Self::Push(push) => Some(push),
            Self::Delete(_) => None,
        }
    }
}

/// The active log set of a version: the previous version's pushes with the
/// incoming entry applied. A push replaces the entry with the same service
/// name (or appends), a delete removes it. The result stays sorted by
/// service name so downstream composition and checksums are order-free.
#[must_use]
pub fn swap_services(previous: &[PushedSchema], incoming: &SchemaLogEntry) -> Vec<PushedSchema> {
    let mut out: Vec<PushedSchema> = Vec::with_capacity(previous.len() + 1);
    match incoming {
        SchemaLogEntry::Push(push) => {
            let mut replaced = false;
            for entry in previous {
                if entry.service_name == push.service_name {
                    out.push(push.clone());
                    replaced = true;
                } else {
                    out.push(entry.clone());
                }
            }
            if !replaced {
                out.push(push.clone());
            }
        }
        SchemaLogEntry::Delete(delete) => {
            for entry in previous {
                if entry.service_name != delete.service_name {
                    out.push(entry.clone());
                }
            }
        }
    }
    out.sort_by(|a, b| a.service_name.cmp(&b.service_name));
    out
}

#[must_use]
pub fn to_service_schemas(pushes: &[PushedSchema]) -> Vec<ServiceSchema> {
    pushes
        .iter()
        .map(|p| ServiceSchema::new(p.service_name.clone(), p.sdl.clone(), p.service_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(name: &str, sdl: &str) -> PushedSchema {
        PushedSchema {
            id: SchemaLogId::generate(),
            sdl: sdl.to_string(),
            service_name: name.to_string(),
            service_url: None,
            metadata: None,
            author: "tester".to_string(),
            commit: "deadbeef".to_string(),
        }
    }

    #[test]
    fn push_replaces_same_service_name() {
        let previous = vec![push("reviews", "type A"), push("users", "type B")];
        let incoming = SchemaLogEntry::Push(push("users", "type B2"));
        let next = swap_services(&previous, &incoming);
        assert_eq!(next.len(), 2);
        assert_eq!(next[1].service_name, "users");
        assert_eq!(next[1].sdl, "type B2");
    }

    #[test]
    fn push_appends_new_service_name() {
        let previous = vec![push("users", "type B")];
        let incoming = SchemaLogEntry::Push(push("reviews", "type A"));
        let next = swap_services(&previous, &incoming);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].service_name, "reviews");
    }

    #[test]
    fn delete_removes_by_service_name() {
        let previous = vec![push("reviews", "type A"), push("users", "type B")];
        let incoming = SchemaLogEntry::Delete(DeletedSchema {
            id: SchemaLogId::generate(),
            service_name: "reviews".to_string(),
            author: None,
        });
        let next = swap_services(&previous, &incoming);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].service_name, "users");
    }

    #[test]
    fn active_set_never_holds_duplicate_service_names() {
        let previous = vec![push("users", "v1")];
        let next = swap_services(&previous, &SchemaLogEntry::Push(push("users", "v2")));
        let names: Vec<_> = next.iter().map(|e| e.service_name.as_str()).collect();
        assert_eq!(names, vec!["users"]);
    }
}

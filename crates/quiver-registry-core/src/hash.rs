// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    #[must_use]
    pub(crate) const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(64);
        for b in self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{b:02x}");
        }
        out
    }
}

impl core::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl core::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[must_use]
pub fn sha256(bytes: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    Hash256::from_bytes(out)
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    sha256(bytes).to_hex()
}

/// Serialize with object keys sorted so the bytes (and any hash over them)
/// do not depend on field declaration or insertion order.
pub fn stable_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let raw = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&normalize_json_value(raw))?)
}

pub fn stable_json_hash_hex<T: Serialize>(value: &T) -> Result<String> {
    Ok(sha256_hex(&stable_json_bytes(value)?))
}

fn normalize_json_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .map(|(k, v)| (k, normalize_json_value(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_json_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn hash_hex_is_64_lowercase_chars() {
        let hex = sha256_hex(b"type Query { ok: Boolean }");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn stable_json_is_insensitive_to_key_order() {
        let mut a = serde_json::Map::new();
        a.insert("b".to_string(), serde_json::json!(1));
        a.insert("a".to_string(), serde_json::json!(2));

        let mut b = serde_json::Map::new();
        b.insert("a".to_string(), serde_json::json!(2));
        b.insert("b".to_string(), serde_json::json!(1));

        let ha = stable_json_hash_hex(&serde_json::Value::Object(a)).expect("hash a");
        let hb = stable_json_hash_hex(&serde_json::Value::Object(b)).expect("hash b");
        assert_eq!(ha, hb);
    }

    #[test]
    fn identity_tuples_hash_deterministically() {
        let meta = BTreeMap::from([
            ("type_name".to_string(), "Query".to_string()),
            ("field_name".to_string(), "me".to_string()),
        ]);
        let first = stable_json_hash_hex(&("FIELD_REMOVED", &meta)).expect("hash");
        let second = stable_json_hash_hex(&("FIELD_REMOVED", &meta)).expect("hash");
        assert_eq!(first, second);
    }
}

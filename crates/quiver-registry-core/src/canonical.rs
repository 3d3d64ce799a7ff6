// SPDX-License-Identifier: Apache-2.0

use async_graphql_parser::parse_schema;

use crate::hash::sha256_hex;
use crate::print::print_canonical;

/// One named schema document as it enters canonicalization. The URL is part
/// of the registered state, so it participates in the checksum: re-pushing
/// an identical document under a new URL is a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaPart<'a> {
    pub name: &'a str,
    pub sdl: &'a str,
    pub url: Option<&'a str>,
}

impl<'a> SchemaPart<'a> {
    #[must_use]
    pub const fn new(name: &'a str, sdl: &'a str, url: Option<&'a str>) -> Self {
        Self { name, sdl, url }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSchema {
    pub text: String,
    pub checksum: String,
}

/// Produce the stable canonical form of a schema set: services sorted by
/// name, each document sorted and reprinted, `base_schema` prepended. Two
/// logically equivalent sets yield byte-identical text and equal checksums
/// regardless of service or member ordering.
#[must_use]
pub fn canonicalize_schema_set(
    parts: &[SchemaPart<'_>],
    base_schema: Option<&str>,
) -> CanonicalSchema {
    let mut sorted: Vec<&SchemaPart<'_>> = parts.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(b.name));

    let mut text = String::new();
    if let Some(base) = base_schema {
        let base = base.trim();
        if !base.is_empty() {
            text.push_str(&canonical_sdl(base).unwrap_or_else(|| normalize_whitespace(base)));
            text.push('\n');
        }
    }
    for part in sorted {
        text.push_str(&format!("# service: {}", part.name));
        if let Some(url) = part.url {
            text.push_str(&format!(" url: {url}"));
        }
        text.push('\n');
        text.push_str(
            &canonical_sdl(part.sdl).unwrap_or_else(|| normalize_whitespace(part.sdl)),
        );
        text.push('\n');
    }

    let checksum = sha256_hex(text.as_bytes());
    CanonicalSchema { text, checksum }
}

/// Canonical form of a single document, or `None` when it does not parse.
/// Callers that must checksum invalid documents (the checksum stage runs
/// before composition) fall back to [`normalize_whitespace`].
#[must_use]
pub fn canonical_sdl(sdl: &str) -> Option<String> {
    let doc = parse_schema(sdl).ok()?;
    Some(print_canonical(&doc))
}

/// Collapse runs of whitespace and drop blank lines. Keeps checksums stable
/// across formatting-only edits of documents we cannot parse.
#[must_use]
pub fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            out.push_str(&collapsed);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_service_order_free() {
        let users = SchemaPart::new("users", "type Query { me: String }", Some("https://u"));
        let reviews = SchemaPart::new("reviews", "type Review { body: String }", Some("https://r"));

        let forward = canonicalize_schema_set(&[users, reviews], None);
        let backward = canonicalize_schema_set(&[reviews, users], None);
        assert_eq!(forward.text, backward.text);
        assert_eq!(forward.checksum, backward.checksum);
    }

    #[test]
    fn checksum_sees_formatting_through() {
        let compact = SchemaPart::new("users", "type Query{me:String}", None);
        let airy = SchemaPart::new("users", "type Query {\n  me: String\n}\n", None);
        assert_eq!(
            canonicalize_schema_set(&[compact], None).checksum,
            canonicalize_schema_set(&[airy], None).checksum
        );
    }

    #[test]
    fn url_participates_in_checksum() {
        let a = SchemaPart::new("users", "type Query { me: String }", Some("https://a"));
        let b = SchemaPart::new("users", "type Query { me: String }", Some("https://b"));
        assert_ne!(
            canonicalize_schema_set(&[a], None).checksum,
            canonicalize_schema_set(&[b], None).checksum
        );
    }

    #[test]
    fn base_schema_prefixes_the_canonical_text() {
        let part = SchemaPart::new("users", "type Query { me: String }", None);
        let with_base =
            canonicalize_schema_set(&[part], Some("directive @auth on FIELD_DEFINITION"));
        let without_base = canonicalize_schema_set(&[part], None);
        assert_ne!(with_base.checksum, without_base.checksum);
        assert!(with_base.text.starts_with("directive @auth"));
    }

    #[test]
    fn unparseable_sdl_still_checksums() {
        let broken = SchemaPart::new("users", "type Query {   me ", None);
        let canonical = canonicalize_schema_set(&[broken], None);
        assert!(!canonical.checksum.is_empty());
        assert!(canonical.text.contains("type Query { me"));
    }
}

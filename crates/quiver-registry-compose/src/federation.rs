// SPDX-License-Identifier: Apache-2.0

//! Federation bookkeeping that must not leak into the public schema:
//! machinery type names, directive tokens, and the root fields the gateway
//! protocol injects. Historical versions composed before filtering existed
//! still carry these, so the same allow-list also drives diff filtering.

use async_graphql_parser::types::{ServiceDocument, TypeKind, TypeSystemDefinition};

pub const FEDERATION_TYPE_NAMES: &[&str] = &[
    "_Any",
    "_Entity",
    "_FieldSet",
    "_Service",
    "FieldSet",
    "core__Purpose",
    "federation__FieldSet",
    "federation__Policy",
    "federation__Scope",
    "join__DirectiveArguments",
    "join__FieldSet",
    "join__FieldValue",
    "join__Graph",
    "link__Import",
    "link__Purpose",
];

pub const FEDERATION_DIRECTIVE_TOKENS: &[&str] = &[
    "@composeDirective",
    "@core",
    "@extends",
    "@external",
    "@inaccessible",
    "@interfaceObject",
    "@join__directive",
    "@join__enumValue",
    "@join__field",
    "@join__graph",
    "@join__implements",
    "@join__type",
    "@join__unionMember",
    "@key",
    "@link",
    "@override",
    "@provides",
    "@requires",
    "@shareable",
];

pub const FEDERATION_ROOT_FIELDS: &[&str] = &["_entities", "_service"];

#[must_use]
pub fn is_federation_type_name(name: &str) -> bool {
    FEDERATION_TYPE_NAMES.contains(&name)
        || name.starts_with("join__")
        || name.starts_with("link__")
        || name.starts_with("federation__")
}

#[must_use]
pub fn is_federation_directive_name(name: &str) -> bool {
    let token = format!("@{name}");
    FEDERATION_DIRECTIVE_TOKENS.contains(&token.as_str())
        || name.starts_with("join__")
        || name.starts_with("link__")
        || name.starts_with("federation__")
}

/// Remove federation machinery from a parsed subgraph document in place:
/// machinery types and directive definitions, directive applications, and
/// the protocol root fields.
pub fn strip_federation_elements(doc: &mut ServiceDocument) {
    doc.definitions.retain(|definition| match definition {
        TypeSystemDefinition::Type(def) => !is_federation_type_name(def.node.name.node.as_str()),
        TypeSystemDefinition::Directive(def) => {
            !is_federation_directive_name(def.node.name.node.as_str())
        }
        TypeSystemDefinition::Schema(_) => true,
    });

    for definition in &mut doc.definitions {
        let TypeSystemDefinition::Type(def) = definition else {
            continue;
        };
        def.node
            .directives
            .retain(|d| !is_federation_directive_name(d.node.name.node.as_str()));
        match &mut def.node.kind {
            TypeKind::Object(object) => {
                let is_root = def.node.name.node.as_str() == "Query";
                object.fields.retain(|field| {
                    !(is_root && FEDERATION_ROOT_FIELDS.contains(&field.node.name.node.as_str()))
                });
                for field in &mut object.fields {
                    field
                        .node
                        .directives
                        .retain(|d| !is_federation_directive_name(d.node.name.node.as_str()));
                }
            }
            TypeKind::Interface(interface) => {
                for field in &mut interface.fields {
                    field
                        .node
                        .directives
                        .retain(|d| !is_federation_directive_name(d.node.name.node.as_str()));
                }
            }
            TypeKind::Enum(enumeration) => {
                for value in &mut enumeration.values {
                    value
                        .node
                        .directives
                        .retain(|d| !is_federation_directive_name(d.node.name.node.as_str()));
                }
            }
            TypeKind::InputObject(input) => {
                for field in &mut input.fields {
                    field
                        .node
                        .directives
                        .retain(|d| !is_federation_directive_name(d.node.name.node.as_str()));
                }
            }
            TypeKind::Scalar | TypeKind::Union(_) => {}
        }
    }
}

/// Collect `@tag(name: "...")` values across types, fields, enum values,
/// and input fields. Sorted and deduplicated.
#[must_use]
pub fn collect_tags(doc: &ServiceDocument) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push_from = |directives: &[async_graphql_parser::Positioned<
        async_graphql_parser::types::ConstDirective,
    >]| {
        for directive in directives {
            if directive.node.name.node.as_str() != "tag" {
                continue;
            }
            for (name, value) in &directive.node.arguments {
                if name.node.as_str() != "name" {
                    continue;
                }
                if let async_graphql_value::ConstValue::String(tag) = &value.node {
                    tags.push(tag.clone());
                }
            }
        }
    };

    for definition in &doc.definitions {
        let TypeSystemDefinition::Type(def) = definition else {
            continue;
        };
        push_from(&def.node.directives);
        match &def.node.kind {
            TypeKind::Object(object) => {
                for field in &object.fields {
                    push_from(&field.node.directives);
                }
            }
            TypeKind::Interface(interface) => {
                for field in &interface.fields {
                    push_from(&field.node.directives);
                }
            }
            TypeKind::Enum(enumeration) => {
                for value in &enumeration.values {
                    push_from(&value.node.directives);
                }
            }
            TypeKind::InputObject(input) => {
                for field in &input.fields {
                    push_from(&field.node.directives);
                }
            }
            TypeKind::Scalar | TypeKind::Union(_) => {}
        }
    }

    tags.sort_unstable();
    tags.dedup();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_schema;
    use quiver_registry_core::print::print_canonical;

    #[test]
    fn strips_machinery_types_and_directives() {
        let mut doc = parse_schema(
            r#"
            scalar _FieldSet
            type Query { _service: String me: String }
            type User @key(fields: "id") { id: ID! name: String @external }
            "#,
        )
        .expect("parse");
        strip_federation_elements(&mut doc);
        let printed = print_canonical(&doc);
        assert!(!printed.contains("_FieldSet"));
        assert!(!printed.contains("_service"));
        assert!(!printed.contains("@key"));
        assert!(!printed.contains("@external"));
        assert!(printed.contains("me: String"));
        assert!(printed.contains("name: String"));
    }

    #[test]
    fn collects_tags_from_types_and_fields() {
        let doc = parse_schema(
            r#"
            type Query { me: String @tag(name: "public") }
            type Billing @tag(name: "internal") { invoice: String }
            enum Plan { FREE PAID @tag(name: "public") }
            "#,
        )
        .expect("parse");
        assert_eq!(collect_tags(&doc), vec!["internal", "public"]);
    }

    #[test]
    fn prefixed_names_count_as_machinery() {
        assert!(is_federation_type_name("join__Graph"));
        assert!(is_federation_type_name("link__Purpose"));
        assert!(!is_federation_type_name("User"));
        assert!(is_federation_directive_name("key"));
        assert!(is_federation_directive_name("join__field"));
        assert!(!is_federation_directive_name("deprecated"));
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Tag-driven contract filtering over a composed document. Exclusion always
//! wins; when an include list is present, object and interface fields must
//! be tagged (directly or via their parent type) to survive. `@tag`
//! directives themselves never appear in the filtered output.

use std::collections::BTreeSet;

use async_graphql_parser::types::{
    ConstDirective, ServiceDocument, Type, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;

use quiver_registry_core::print::base_type_name;

use crate::orchestrator::ContractFilter;

const BUILTIN_SCALARS: &[&str] = &["Boolean", "Float", "ID", "Int", "String"];

pub fn apply_contract_filter(
    doc: &ServiceDocument,
    filter: &ContractFilter,
) -> Result<ServiceDocument, String> {
    let mut filtered = ServiceDocument {
        definitions: Vec::new(),
    };

    for definition in &doc.definitions {
        match definition {
            TypeSystemDefinition::Schema(def) => {
                filtered
                    .definitions
                    .push(TypeSystemDefinition::Schema(def.clone()));
            }
            TypeSystemDefinition::Directive(def) => {
                filtered
                    .definitions
                    .push(TypeSystemDefinition::Directive(def.clone()));
            }
            TypeSystemDefinition::Type(def) => {
                if let Some(kept) = filter_type(&def.node, filter) {
                    filtered
                        .definitions
                        .push(TypeSystemDefinition::Type(Positioned::new(
                            kept,
                            def.pos,
                        )));
                }
            }
        }
    }

    drop_dangling_members(&mut filtered);

    if filter.remove_unreachable_types_from_public_api_schema {
        remove_unreachable_types(&mut filtered);
    }

    let query_has_fields = filtered.definitions.iter().any(|definition| {
        let TypeSystemDefinition::Type(def) = definition else {
            return false;
        };
        def.node.name.node.as_str() == "Query"
            && matches!(&def.node.kind, TypeKind::Object(object) if !object.fields.is_empty())
    });
    if !query_has_fields {
        return Err("contract filter produced an empty public api schema (no Query fields remain)"
            .to_string());
    }

    Ok(filtered)
}

fn filter_type(def: &TypeDefinition, filter: &ContractFilter) -> Option<TypeDefinition> {
    let type_tags = directive_tags(&def.directives);
    if tags_intersect(&type_tags, &filter.exclude_tags) {
        return None;
    }
    let include_mode = !filter.include_tags.is_empty();
    let type_included = tags_intersect(&type_tags, &filter.include_tags);

    let mut kept = def.clone();
    strip_tag_directives(&mut kept.directives);

    match &mut kept.kind {
        TypeKind::Object(object) => {
            object.fields.retain(|field| {
                keep_member(&field.node.directives, filter, include_mode, type_included)
            });
            for field in &mut object.fields {
                strip_tag_directives(&mut field.node.directives);
            }
            if object.fields.is_empty() {
                return None;
            }
        }
        TypeKind::Interface(interface) => {
            interface.fields.retain(|field| {
                keep_member(&field.node.directives, filter, include_mode, type_included)
            });
            for field in &mut interface.fields {
                strip_tag_directives(&mut field.node.directives);
            }
            if interface.fields.is_empty() {
                return None;
            }
        }
        TypeKind::Enum(enumeration) => {
            enumeration
                .values
                .retain(|value| !tags_intersect(&directive_tags(&value.node.directives), &filter.exclude_tags));
            for value in &mut enumeration.values {
                strip_tag_directives(&mut value.node.directives);
            }
            if enumeration.values.is_empty() {
                return None;
            }
        }
        TypeKind::InputObject(input) => {
            input
                .fields
                .retain(|field| !tags_intersect(&directive_tags(&field.node.directives), &filter.exclude_tags));
            for field in &mut input.fields {
                strip_tag_directives(&mut field.node.directives);
            }
            if input.fields.is_empty() {
                return None;
            }
        }
        // Scalars and unions ride along; dangling members are swept after
        // type-level filtering settles.
        TypeKind::Scalar | TypeKind::Union(_) => {}
    }

    Some(kept)
}

fn keep_member(
    directives: &[Positioned<ConstDirective>],
    filter: &ContractFilter,
    include_mode: bool,
    type_included: bool,
) -> bool {
    let tags = directive_tags(directives);
    if tags_intersect(&tags, &filter.exclude_tags) {
        return false;
    }
    if include_mode {
        return type_included || tags_intersect(&tags, &filter.include_tags);
    }
    true
}

fn directive_tags(directives: &[Positioned<ConstDirective>]) -> Vec<String> {
    let mut tags = Vec::new();
    for directive in directives {
        if directive.node.name.node.as_str() != "tag" {
            continue;
        }
        for (name, value) in &directive.node.arguments {
            if name.node.as_str() == "name" {
                if let async_graphql_value::ConstValue::String(tag) = &value.node {
                    tags.push(tag.clone());
                }
            }
        }
    }
    tags
}

fn tags_intersect(tags: &[String], other: &[String]) -> bool {
    tags.iter().any(|t| other.contains(t))
}

fn strip_tag_directives(directives: &mut Vec<Positioned<ConstDirective>>) {
    directives.retain(|d| d.node.name.node.as_str() != "tag");
}

/// After type-level filtering, references can dangle: union members and
/// implements lists pointing at removed types, fields returning them. Drop
/// those references and then any member container that became empty.
fn drop_dangling_members(doc: &mut ServiceDocument) {
    let surviving: BTreeSet<String> = doc
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            TypeSystemDefinition::Type(def) => Some(def.node.name.node.to_string()),
            _ => None,
        })
        .collect();

    let exists = |ty: &Type| -> bool {
        let name = base_type_name(ty);
        BUILTIN_SCALARS.contains(&name) || surviving.contains(name)
    };

    for definition in &mut doc.definitions {
        let TypeSystemDefinition::Type(def) = definition else {
            continue;
        };
        match &mut def.node.kind {
            TypeKind::Object(object) => {
                object
                    .implements
                    .retain(|i| surviving.contains(i.node.as_str()));
                object.fields.retain(|f| {
                    exists(&f.node.ty.node)
                        && f.node.arguments.iter().all(|a| exists(&a.node.ty.node))
                });
            }
            TypeKind::Interface(interface) => {
                interface
                    .implements
                    .retain(|i| surviving.contains(i.node.as_str()));
                interface.fields.retain(|f| {
                    exists(&f.node.ty.node)
                        && f.node.arguments.iter().all(|a| exists(&a.node.ty.node))
                });
            }
            TypeKind::Union(union) => {
                union.members.retain(|m| surviving.contains(m.node.as_str()));
            }
            TypeKind::InputObject(input) => {
                input.fields.retain(|f| exists(&f.node.ty.node));
            }
            TypeKind::Scalar | TypeKind::Enum(_) => {}
        }
    }

    doc.definitions.retain(|definition| match definition {
        TypeSystemDefinition::Type(def) => match &def.node.kind {
            TypeKind::Object(object) => !object.fields.is_empty(),
            TypeKind::Interface(interface) => !interface.fields.is_empty(),
            TypeKind::Union(union) => !union.members.is_empty(),
            TypeKind::InputObject(input) => !input.fields.is_empty(),
            TypeKind::Scalar | TypeKind::Enum(_) => true,
        },
        _ => true,
    });
}

fn remove_unreachable_types(doc: &mut ServiceDocument) {
    let mut roots: Vec<String> = vec![
        "Query".to_string(),
        "Mutation".to_string(),
        "Subscription".to_string(),
    ];
    for definition in &doc.definitions {
        if let TypeSystemDefinition::Schema(def) = definition {
            for root in [&def.node.query, &def.node.mutation, &def.node.subscription]
                .into_iter()
                .flatten()
            {
                roots.push(root.node.to_string());
            }
        }
    }

    let mut reachable: BTreeSet<String> = BTreeSet::new();
    let mut frontier: Vec<String> = roots;
    while let Some(name) = frontier.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let Some(def) = find_type(doc, &name) else {
            continue;
        };
        let mut push = |ty_name: &str| {
            if !reachable.contains(ty_name) {
                frontier.push(ty_name.to_string());
            }
        };
        match &def.kind {
            TypeKind::Object(object) => {
                for implemented in &object.implements {
                    push(implemented.node.as_str());
                }
                for field in &object.fields {
                    push(base_type_name(&field.node.ty.node));
                    for argument in &field.node.arguments {
                        push(base_type_name(&argument.node.ty.node));
                    }
                }
            }
            TypeKind::Interface(interface) => {
                for implemented in &interface.implements {
                    push(implemented.node.as_str());
                }
                for field in &interface.fields {
                    push(base_type_name(&field.node.ty.node));
                    for argument in &field.node.arguments {
                        push(base_type_name(&argument.node.ty.node));
                    }
                }
                // Possible objects of an interface are part of its API.
                for definition in &doc.definitions {
                    if let TypeSystemDefinition::Type(candidate) = definition {
                        if let TypeKind::Object(object) = &candidate.node.kind {
                            if object.implements.iter().any(|i| i.node.as_str() == name) {
                                push(candidate.node.name.node.as_str());
                            }
                        }
                    }
                }
            }
            TypeKind::Union(union) => {
                for member in &union.members {
                    push(member.node.as_str());
                }
            }
            TypeKind::InputObject(input) => {
                for field in &input.fields {
                    push(base_type_name(&field.node.ty.node));
                }
            }
            TypeKind::Scalar | TypeKind::Enum(_) => {}
        }
    }

    doc.definitions.retain(|definition| match definition {
        TypeSystemDefinition::Type(def) => reachable.contains(def.node.name.node.as_str()),
        _ => true,
    });
}

fn find_type<'a>(doc: &'a ServiceDocument, name: &str) -> Option<&'a TypeDefinition> {
    doc.definitions.iter().find_map(|definition| match definition {
        TypeSystemDefinition::Type(def) if def.node.name.node.as_str() == name => Some(&def.node),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_schema;
    use quiver_registry_core::print::print_canonical;

    fn filter(include: &[&str], exclude: &[&str], remove_unreachable: bool) -> ContractFilter {
        ContractFilter {
            include_tags: include.iter().map(|s| s.to_string()).collect(),
            exclude_tags: exclude.iter().map(|s| s.to_string()).collect(),
            remove_unreachable_types_from_public_api_schema: remove_unreachable,
        }
    }

    #[test]
    fn exclude_drops_tagged_fields_and_types() {
        let doc = parse_schema(
            r#"
            type Query { me: String secret: String @tag(name: "internal") }
            type Audit @tag(name: "internal") { entry: String }
            "#,
        )
        .expect("parse");
        let filtered =
            apply_contract_filter(&doc, &filter(&[], &["internal"], false)).expect("filter");
        let printed = print_canonical(&filtered);
        assert!(printed.contains("me: String"));
        assert!(!printed.contains("secret"));
        assert!(!printed.contains("Audit"));
        assert!(!printed.contains("@tag"));
    }

    #[test]
    fn include_mode_requires_a_tag_on_field_or_type() {
        let doc = parse_schema(
            r#"
            type Query { me: String @tag(name: "public") internal: String }
            type Billing @tag(name: "public") { invoice: String }
            type Hidden { x: String }
            "#,
        )
        .expect("parse");
        let filtered =
            apply_contract_filter(&doc, &filter(&["public"], &[], false)).expect("filter");
        let printed = print_canonical(&filtered);
        assert!(printed.contains("me: String"));
        assert!(!printed.contains("internal"));
        assert!(printed.contains("invoice: String"));
        assert!(!printed.contains("Hidden"));
    }

    #[test]
    fn empty_query_is_a_contract_error() {
        let doc = parse_schema("type Query { secret: String @tag(name: \"internal\") }")
            .expect("parse");
        let result = apply_contract_filter(&doc, &filter(&[], &["internal"], false));
        assert!(result.is_err());
    }

    #[test]
    fn unreachable_types_are_removed_when_requested() {
        let doc = parse_schema(
            r#"
            type Query { me: User }
            type User { id: ID! }
            type Orphan { x: String }
            "#,
        )
        .expect("parse");
        let filtered =
            apply_contract_filter(&doc, &filter(&[], &[], true)).expect("filter");
        let printed = print_canonical(&filtered);
        assert!(printed.contains("type User"));
        assert!(!printed.contains("Orphan"));
    }

    #[test]
    fn union_members_follow_their_types_out() {
        let doc = parse_schema(
            r#"
            type Query { search: Result }
            union Result = Book | Film
            type Book { title: String }
            type Film @tag(name: "internal") { name: String }
            "#,
        )
        .expect("parse");
        let filtered =
            apply_contract_filter(&doc, &filter(&[], &["internal"], false)).expect("filter");
        let printed = print_canonical(&filtered);
        assert!(printed.contains("union Result = Book"));
        assert!(!printed.contains("Film"));
    }
}

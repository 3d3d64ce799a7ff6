// SPDX-License-Identifier: Apache-2.0

//! Deterministic SDL printer. Definitions, members, arguments, and
//! directives are emitted in sorted order so that logically equivalent
//! documents print byte-identically.

use async_graphql_parser::types::{
    BaseType, ConstDirective, DirectiveDefinition, DirectiveLocation, EnumType, FieldDefinition,
    InputObjectType, InputValueDefinition, SchemaDefinition, ServiceDocument, Type, TypeDefinition,
    TypeKind, TypeSystemDefinition,
};
use async_graphql_parser::Positioned;

#[must_use]
pub fn print_canonical(doc: &ServiceDocument) -> String {
    let mut schemas: Vec<&SchemaDefinition> = Vec::new();
    let mut directives: Vec<&DirectiveDefinition> = Vec::new();
    let mut types: Vec<&TypeDefinition> = Vec::new();
    for definition in &doc.definitions {
        match definition {
            TypeSystemDefinition::Schema(def) => schemas.push(&def.node),
            TypeSystemDefinition::Directive(def) => directives.push(&def.node),
            TypeSystemDefinition::Type(def) => types.push(&def.node),
        }
    }
    directives.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));
    types.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));

    let mut out = String::new();
    for schema in schemas {
        print_schema_definition(&mut out, schema);
    }
    for directive in directives {
        print_directive_definition(&mut out, directive);
    }
    for ty in types {
        print_type_definition(&mut out, ty);
    }
    out
}

fn print_schema_definition(out: &mut String, def: &SchemaDefinition) {
    if def.extend {
        out.push_str("extend ");
    }
    out.push_str("schema");
    print_directives(out, &def.directives);
    out.push_str(" {\n");
    if let Some(query) = &def.query {
        out.push_str(&format!("  query: {}\n", query.node));
    }
    if let Some(mutation) = &def.mutation {
        out.push_str(&format!("  mutation: {}\n", mutation.node));
    }
    if let Some(subscription) = &def.subscription {
        out.push_str(&format!("  subscription: {}\n", subscription.node));
    }
    out.push_str("}\n\n");
}

fn print_directive_definition(out: &mut String, def: &DirectiveDefinition) {
    print_description(out, def.description.as_ref().map(|d| d.node.as_str()), "");
    out.push_str(&format!("directive @{}", def.name.node));
    print_argument_definitions(out, &def.arguments);
    if def.is_repeatable {
        out.push_str(" repeatable");
    }
    out.push_str(" on ");
    let mut locations: Vec<&'static str> = def
        .locations
        .iter()
        .map(|l| directive_location_str(&l.node))
        .collect();
    locations.sort_unstable();
    out.push_str(&locations.join(" | "));
    out.push_str("\n\n");
}

fn print_type_definition(out: &mut String, def: &TypeDefinition) {
    print_description(out, def.description.as_ref().map(|d| d.node.as_str()), "");
    if def.extend {
        out.push_str("extend ");
    }
    let name = def.name.node.as_str();
    match &def.kind {
        TypeKind::Scalar => {
            out.push_str(&format!("scalar {name}"));
            print_directives(out, &def.directives);
            out.push('\n');
        }
        TypeKind::Object(object) => {
            out.push_str(&format!("type {name}"));
            print_implements(out, &object.implements);
            print_directives(out, &def.directives);
            print_fields(out, &object.fields);
        }
        TypeKind::Interface(interface) => {
            out.push_str(&format!("interface {name}"));
            print_implements(out, &interface.implements);
            print_directives(out, &def.directives);
            print_fields(out, &interface.fields);
        }
        TypeKind::Union(union) => {
            out.push_str(&format!("union {name}"));
            print_directives(out, &def.directives);
            let mut members: Vec<&str> =
                union.members.iter().map(|m| m.node.as_str()).collect();
            members.sort_unstable();
            out.push_str(" = ");
            out.push_str(&members.join(" | "));
            out.push('\n');
        }
        TypeKind::Enum(enumeration) => {
            out.push_str(&format!("enum {name}"));
            print_directives(out, &def.directives);
            print_enum_values(out, enumeration);
        }
        TypeKind::InputObject(input) => {
            out.push_str(&format!("input {name}"));
            print_directives(out, &def.directives);
            print_input_fields(out, input);
        }
    }
    out.push('\n');
}

fn print_implements(out: &mut String, implements: &[Positioned<async_graphql_value::Name>]) {
    if implements.is_empty() {
        return;
    }
    let mut names: Vec<&str> = implements.iter().map(|i| i.node.as_str()).collect();
    names.sort_unstable();
    out.push_str(" implements ");
    out.push_str(&names.join(" & "));
}

fn print_fields(out: &mut String, fields: &[Positioned<FieldDefinition>]) {
    let mut sorted: Vec<&FieldDefinition> = fields.iter().map(|f| &f.node).collect();
    sorted.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));
    out.push_str(" {\n");
    for field in sorted {
        print_description(out, field.description.as_ref().map(|d| d.node.as_str()), "  ");
        out.push_str(&format!("  {}", field.name.node));
        print_argument_definitions(out, &field.arguments);
        out.push_str(&format!(": {}", render_type(&field.ty.node)));
        print_directives(out, &field.directives);
        out.push('\n');
    }
    out.push('}');
}

fn print_enum_values(out: &mut String, enumeration: &EnumType) {
    let mut sorted: Vec<_> = enumeration.values.iter().map(|v| &v.node).collect();
    sorted.sort_by(|a, b| a.value.node.as_str().cmp(b.value.node.as_str()));
    out.push_str(" {\n");
    for value in sorted {
        print_description(out, value.description.as_ref().map(|d| d.node.as_str()), "  ");
        out.push_str(&format!("  {}", value.value.node));
        print_directives(out, &value.directives);
        out.push('\n');
    }
    out.push('}');
}

fn print_input_fields(out: &mut String, input: &InputObjectType) {
    let mut sorted: Vec<&InputValueDefinition> = input.fields.iter().map(|f| &f.node).collect();
    sorted.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));
    out.push_str(" {\n");
    for field in sorted {
        print_description(out, field.description.as_ref().map(|d| d.node.as_str()), "  ");
        out.push_str("  ");
        print_input_value(out, field);
        out.push('\n');
    }
    out.push('}');
}

fn print_argument_definitions(out: &mut String, arguments: &[Positioned<InputValueDefinition>]) {
    if arguments.is_empty() {
        return;
    }
    let mut sorted: Vec<&InputValueDefinition> = arguments.iter().map(|a| &a.node).collect();
    sorted.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));
    out.push('(');
    for (index, argument) in sorted.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        print_input_value(out, argument);
    }
    out.push(')');
}

fn print_input_value(out: &mut String, value: &InputValueDefinition) {
    out.push_str(&format!("{}: {}", value.name.node, render_type(&value.ty.node)));
    if let Some(default) = &value.default_value {
        out.push_str(&format!(" = {}", default.node));
    }
    print_directives(out, &value.directives);
}

fn print_directives(out: &mut String, directives: &[Positioned<ConstDirective>]) {
    let mut sorted: Vec<&ConstDirective> = directives.iter().map(|d| &d.node).collect();
    sorted.sort_by(|a, b| a.name.node.as_str().cmp(b.name.node.as_str()));
    for directive in sorted {
        out.push_str(&format!(" @{}", directive.name.node));
        if !directive.arguments.is_empty() {
            let mut arguments: Vec<(&str, String)> = directive
                .arguments
                .iter()
                .map(|(name, value)| (name.node.as_str(), value.node.to_string()))
                .collect();
            arguments.sort_by(|a, b| a.0.cmp(b.0));
            out.push('(');
            for (index, (name, value)) in arguments.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format!("{name}: {value}"));
            }
            out.push(')');
        }
    }
}

fn print_description(out: &mut String, description: Option<&str>, indent: &str) {
    if let Some(text) = description {
        let escaped = text.replace("\"\"\"", "\\\"\"\"");
        out.push_str(&format!("{indent}\"\"\"{escaped}\"\"\"\n"));
    }
}

/// `Type` implements `Display` upstream; kept behind one function so the
/// canonical rendering has a single owner.
#[must_use]
pub fn render_type(ty: &Type) -> String {
    ty.to_string()
}

#[must_use]
pub fn base_type_name(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(inner) => base_type_name(inner),
    }
}

#[must_use]
pub const fn directive_location_str(location: &DirectiveLocation) -> &'static str {
    match location {
        DirectiveLocation::Query => "QUERY",
        DirectiveLocation::Mutation => "MUTATION",
        DirectiveLocation::Subscription => "SUBSCRIPTION",
        DirectiveLocation::Field => "FIELD",
        DirectiveLocation::FragmentDefinition => "FRAGMENT_DEFINITION",
        DirectiveLocation::FragmentSpread => "FRAGMENT_SPREAD",
        DirectiveLocation::InlineFragment => "INLINE_FRAGMENT",
        DirectiveLocation::VariableDefinition => "VARIABLE_DEFINITION",
        DirectiveLocation::Schema => "SCHEMA",
        DirectiveLocation::Scalar => "SCALAR",
        DirectiveLocation::Object => "OBJECT",
        DirectiveLocation::FieldDefinition => "FIELD_DEFINITION",
        DirectiveLocation::ArgumentDefinition => "ARGUMENT_DEFINITION",
        DirectiveLocation::Interface => "INTERFACE",
        DirectiveLocation::Union => "UNION",
        DirectiveLocation::Enum => "ENUM",
        DirectiveLocation::EnumValue => "ENUM_VALUE",
        DirectiveLocation::InputObject => "INPUT_OBJECT",
        DirectiveLocation::InputFieldDefinition => "INPUT_FIELD_DEFINITION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_schema;

    #[test]
    fn member_order_does_not_affect_output() {
        let a = parse_schema("type Query { b: Int a: String }").expect("parse a");
        let b = parse_schema("type Query { a: String b: Int }").expect("parse b");
        assert_eq!(print_canonical(&a), print_canonical(&b));
    }

    #[test]
    fn type_order_does_not_affect_output() {
        let a = parse_schema("type B { x: Int } type A { y: Int }").expect("parse a");
        let b = parse_schema("type A { y: Int } type B { x: Int }").expect("parse b");
        assert_eq!(print_canonical(&a), print_canonical(&b));
    }

    #[test]
    fn union_members_and_enum_values_are_sorted() {
        let doc =
            parse_schema("union U = B | A enum E { ZULU ALPHA }").expect("parse");
        let printed = print_canonical(&doc);
        assert!(printed.contains("union U = A | B"));
        let alpha = printed.find("ALPHA").expect("alpha");
        let zulu = printed.find("ZULU").expect("zulu");
        assert!(alpha < zulu);
    }

    #[test]
    fn arguments_and_defaults_survive_printing() {
        let doc = parse_schema(
            "type Query { user(id: ID!, active: Boolean = true): String }",
        )
        .expect("parse");
        let printed = print_canonical(&doc);
        assert!(printed.contains("user(active: Boolean = true, id: ID!): String"));
    }
}

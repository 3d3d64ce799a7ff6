// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use async_graphql_parser::types::{
    ConstDirective, DirectiveDefinition, EnumType, FieldDefinition, InputObjectType,
    InputValueDefinition, ServiceDocument, TypeDefinition, TypeKind, TypeSystemDefinition,
    UnionType,
};
use async_graphql_parser::{parse_schema, Positioned};

use quiver_registry_core::print::render_type;
use quiver_registry_core::stable_json_hash_hex;
use quiver_registry_model::{ChangeSeverity, SchemaChange, SchemaChangeType};

use crate::severity::{
    is_required_input, is_safe_input_type_change, is_safe_output_type_change,
};
use crate::usage::{UsageOracle, UsageOracleError, UsageSelector};

/// Diff two composed documents and classify every structural difference.
/// Returns `None` when either side is absent or unparseable; the caller
/// reports that stage as skipped. Breaking changes are checked against the
/// usage oracle and flagged usage-safe when their coordinate saw no
/// traffic. Output ordering is stable for equal inputs.
pub async fn diff_schemas(
    existing: Option<&str>,
    incoming: Option<&str>,
    selector: &UsageSelector,
    oracle: &dyn UsageOracle,
) -> Result<Option<Vec<SchemaChange>>, UsageOracleError> {
    let (Some(existing), Some(incoming)) = (existing, incoming) else {
        return Ok(None);
    };
    let (Ok(old_doc), Ok(new_doc)) = (parse_schema(existing), parse_schema(incoming)) else {
        return Ok(None);
    };

    let mut changes = diff_documents(&old_doc, &new_doc);
    enrich_with_usage(&mut changes, selector, oracle).await?;
    Ok(Some(changes))
}

async fn enrich_with_usage(
    changes: &mut [SchemaChange],
    selector: &UsageSelector,
    oracle: &dyn UsageOracle,
) -> Result<(), UsageOracleError> {
    let coordinates: Vec<String> = changes
        .iter()
        .filter(|c| c.severity == ChangeSeverity::Breaking)
        .filter_map(|c| c.path.clone())
        .collect();
    if coordinates.is_empty() {
        return Ok(());
    }
    let unused = oracle.unused_coordinates(selector, &coordinates).await?;
    for change in changes.iter_mut() {
        if change.severity != ChangeSeverity::Breaking {
            continue;
        }
        if let Some(path) = &change.path {
            if unused.contains(path) {
                change.is_safe_based_on_usage = true;
            }
        }
    }
    Ok(())
}

#[must_use]
pub fn diff_documents(old: &ServiceDocument, new: &ServiceDocument) -> Vec<SchemaChange> {
    let mut ctx = DiffContext::default();

    let old_types = type_map(old);
    let new_types = type_map(new);
    for (name, old_def) in &old_types {
        match new_types.get(name) {
            None => ctx.push(
                SchemaChangeType::TypeRemoved,
                ChangeSeverity::Breaking,
                format!("Type `{name}` was removed"),
                Some(name.clone()),
                meta(&[("type_name", name)]),
            ),
            Some(new_def) => diff_type(&mut ctx, name, old_def, new_def),
        }
    }
    for name in new_types.keys() {
        if !old_types.contains_key(name) {
            ctx.push(
                SchemaChangeType::TypeAdded,
                ChangeSeverity::Safe,
                format!("Type `{name}` was added"),
                Some(name.clone()),
                meta(&[("type_name", name)]),
            );
        }
    }

    let old_directives = directive_map(old);
    let new_directives = directive_map(new);
    for name in old_directives.keys() {
        if !new_directives.contains_key(name) {
            ctx.push(
                SchemaChangeType::DirectiveRemoved,
                ChangeSeverity::Breaking,
                format!("Directive `@{name}` was removed"),
                Some(format!("@{name}")),
                meta(&[("directive_name", name)]),
            );
        }
    }
    for name in new_directives.keys() {
        if !old_directives.contains_key(name) {
            ctx.push(
                SchemaChangeType::DirectiveAdded,
                ChangeSeverity::Safe,
                format!("Directive `@{name}` was added"),
                Some(format!("@{name}")),
                meta(&[("directive_name", name)]),
            );
        }
    }

    ctx.changes
}

fn diff_type(ctx: &mut DiffContext, name: &str, old: &TypeDefinition, new: &TypeDefinition) {
    let old_kind = kind_name(&old.kind);
    let new_kind = kind_name(&new.kind);
    if old_kind != new_kind {
        ctx.push(
            SchemaChangeType::TypeKindChanged,
            ChangeSeverity::Breaking,
            format!("Type `{name}` changed kind from `{old_kind}` to `{new_kind}`"),
            Some(name.to_string()),
            meta(&[
                ("type_name", name),
                ("old_kind", old_kind),
                ("new_kind", new_kind),
            ]),
        );
        return;
    }

    let old_description = old.description.as_ref().map(|d| d.node.as_str());
    let new_description = new.description.as_ref().map(|d| d.node.as_str());
    if old_description != new_description {
        ctx.push(
            SchemaChangeType::TypeDescriptionChanged,
            ChangeSeverity::Safe,
            format!("Description of type `{name}` changed"),
            Some(name.to_string()),
            meta(&[("type_name", name)]),
        );
    }

    match (&old.kind, &new.kind) {
        (TypeKind::Object(old_object), TypeKind::Object(new_object)) => {
            diff_implements(ctx, name, &old_object.implements, &new_object.implements);
            diff_fields(ctx, name, &old_object.fields, &new_object.fields);
        }
        (TypeKind::Interface(old_interface), TypeKind::Interface(new_interface)) => {
            diff_implements(ctx, name, &old_interface.implements, &new_interface.implements);
            diff_fields(ctx, name, &old_interface.fields, &new_interface.fields);
        }
        (TypeKind::Enum(old_enum), TypeKind::Enum(new_enum)) => {
            diff_enum(ctx, name, old_enum, new_enum);
        }
        (TypeKind::Union(old_union), TypeKind::Union(new_union)) => {
            diff_union(ctx, name, old_union, new_union);
        }
        (TypeKind::InputObject(old_input), TypeKind::InputObject(new_input)) => {
            diff_input(ctx, name, old_input, new_input);
        }
        (TypeKind::Scalar, TypeKind::Scalar) => {}
        // Kind mismatch handled above.
        _ => {}
    }
}

fn diff_implements(
    ctx: &mut DiffContext,
    type_name: &str,
    old: &[Positioned<async_graphql_value::Name>],
    new: &[Positioned<async_graphql_value::Name>],
) {
    let old_names: Vec<&str> = old.iter().map(|i| i.node.as_str()).collect();
    let new_names: Vec<&str> = new.iter().map(|i| i.node.as_str()).collect();
    for interface in &old_names {
        if !new_names.contains(interface) {
            ctx.push(
                SchemaChangeType::ObjectTypeInterfaceRemoved,
                ChangeSeverity::Breaking,
                format!("`{type_name}` no longer implements `{interface}`"),
                Some(type_name.to_string()),
                meta(&[("type_name", type_name), ("interface_name", interface)]),
            );
        }
    }
    for interface in &new_names {
        if !old_names.contains(interface) {
            ctx.push(
                SchemaChangeType::ObjectTypeInterfaceAdded,
                ChangeSeverity::Dangerous,
                format!("`{type_name}` now implements `{interface}`"),
                Some(type_name.to_string()),
                meta(&[("type_name", type_name), ("interface_name", interface)]),
            );
        }
    }
}

fn diff_fields(
    ctx: &mut DiffContext,
    type_name: &str,
    old: &[Positioned<FieldDefinition>],
    new: &[Positioned<FieldDefinition>],
) {
    let old_fields = field_map(old);
    let new_fields = field_map(new);

    for (field_name, old_field) in &old_fields {
        let path = format!("{type_name}.{field_name}");
        match new_fields.get(field_name) {
            None => ctx.push(
                SchemaChangeType::FieldRemoved,
                ChangeSeverity::Breaking,
                format!("Field `{path}` was removed"),
                Some(path.clone()),
                meta(&[("type_name", type_name), ("field_name", field_name)]),
            ),
            Some(new_field) => {
                diff_field(ctx, type_name, field_name, old_field, new_field);
            }
        }
    }
    for field_name in new_fields.keys() {
        if !old_fields.contains_key(field_name) {
            let path = format!("{type_name}.{field_name}");
            ctx.push(
                SchemaChangeType::FieldAdded,
                ChangeSeverity::Safe,
                format!("Field `{path}` was added"),
                Some(path),
                meta(&[("type_name", type_name), ("field_name", field_name)]),
            );
        }
    }
}

fn diff_field(
    ctx: &mut DiffContext,
    type_name: &str,
    field_name: &str,
    old: &FieldDefinition,
    new: &FieldDefinition,
) {
    let path = format!("{type_name}.{field_name}");

    let old_type = render_type(&old.ty.node);
    let new_type = render_type(&new.ty.node);
    if old_type != new_type {
        let severity = if is_safe_output_type_change(&old.ty.node, &new.ty.node) {
            ChangeSeverity::Safe
        } else {
            ChangeSeverity::Breaking
        };
        ctx.push(
            SchemaChangeType::FieldTypeChanged,
            severity,
            format!("Field `{path}` changed type from `{old_type}` to `{new_type}`"),
            Some(path.clone()),
            meta(&[
                ("type_name", type_name),
                ("field_name", field_name),
                ("old_type", &old_type),
                ("new_type", &new_type),
            ]),
        );
    }

    let was_deprecated = has_directive(&old.directives, "deprecated");
    let is_deprecated = has_directive(&new.directives, "deprecated");
    if !was_deprecated && is_deprecated {
        ctx.push(
            SchemaChangeType::FieldDeprecationAdded,
            ChangeSeverity::Safe,
            format!("Field `{path}` is deprecated"),
            Some(path.clone()),
            meta(&[("type_name", type_name), ("field_name", field_name)]),
        );
    } else if was_deprecated && !is_deprecated {
        ctx.push(
            SchemaChangeType::FieldDeprecationRemoved,
            ChangeSeverity::Safe,
            format!("Field `{path}` is no longer deprecated"),
            Some(path.clone()),
            meta(&[("type_name", type_name), ("field_name", field_name)]),
        );
    }

    diff_arguments(ctx, type_name, field_name, &old.arguments, &new.arguments);
}

fn diff_arguments(
    ctx: &mut DiffContext,
    type_name: &str,
    field_name: &str,
    old: &[Positioned<InputValueDefinition>],
    new: &[Positioned<InputValueDefinition>],
) {
    let old_args = input_value_map(old);
    let new_args = input_value_map(new);

    for (arg_name, old_arg) in &old_args {
        let path = format!("{type_name}.{field_name}.{arg_name}");
        match new_args.get(arg_name) {
            None => ctx.push(
                SchemaChangeType::FieldArgumentRemoved,
                ChangeSeverity::Breaking,
                format!("Argument `{arg_name}` was removed from `{type_name}.{field_name}`"),
                Some(path.clone()),
                meta(&[
                    ("type_name", type_name),
                    ("field_name", field_name),
                    ("argument_name", arg_name),
                ]),
            ),
            Some(new_arg) => {
                let old_type = render_type(&old_arg.ty.node);
                let new_type = render_type(&new_arg.ty.node);
                if old_type != new_type {
                    let severity =
                        if is_safe_input_type_change(&old_arg.ty.node, &new_arg.ty.node) {
                            ChangeSeverity::Safe
                        } else {
                            ChangeSeverity::Breaking
                        };
                    ctx.push(
                        SchemaChangeType::FieldArgumentTypeChanged,
                        severity,
                        format!(
                            "Argument `{arg_name}` of `{type_name}.{field_name}` changed type \
                             from `{old_type}` to `{new_type}`"
                        ),
                        Some(path.clone()),
                        meta(&[
                            ("type_name", type_name),
                            ("field_name", field_name),
                            ("argument_name", arg_name),
                            ("old_type", &old_type),
                            ("new_type", &new_type),
                        ]),
                    );
                }
                let old_default = old_arg.default_value.as_ref().map(|d| d.node.to_string());
                let new_default = new_arg.default_value.as_ref().map(|d| d.node.to_string());
                if old_default != new_default {
                    ctx.push(
                        SchemaChangeType::FieldArgumentDefaultChanged,
                        ChangeSeverity::Dangerous,
                        format!(
                            "Default value of argument `{arg_name}` on `{type_name}.{field_name}` changed"
                        ),
                        Some(path.clone()),
                        meta(&[
                            ("type_name", type_name),
                            ("field_name", field_name),
                            ("argument_name", arg_name),
                            ("old_default", old_default.as_deref().unwrap_or("")),
                            ("new_default", new_default.as_deref().unwrap_or("")),
                        ]),
                    );
                }
            }
        }
    }
    for (arg_name, new_arg) in &new_args {
        if old_args.contains_key(arg_name) {
            continue;
        }
        let path = format!("{type_name}.{field_name}.{arg_name}");
        let required = is_required_input(&new_arg.ty.node, new_arg.default_value.is_some());
        let severity = if required {
            ChangeSeverity::Breaking
        } else {
            ChangeSeverity::Dangerous
        };
        ctx.push(
            SchemaChangeType::FieldArgumentAdded,
            severity,
            format!(
                "{} argument `{arg_name}` was added to `{type_name}.{field_name}`",
                if required { "Required" } else { "Optional" }
            ),
            Some(path),
            meta(&[
                ("type_name", type_name),
                ("field_name", field_name),
                ("argument_name", arg_name),
            ]),
        );
    }
}

fn diff_enum(ctx: &mut DiffContext, name: &str, old: &EnumType, new: &EnumType) {
    let old_values: BTreeMap<&str, ()> = old
        .values
        .iter()
        .map(|v| (v.node.value.node.as_str(), ()))
        .collect();
    let new_values: BTreeMap<&str, ()> = new
        .values
        .iter()
        .map(|v| (v.node.value.node.as_str(), ()))
        .collect();

    for value in old_values.keys() {
        if !new_values.contains_key(value) {
            let path = format!("{name}.{value}");
            ctx.push(
                SchemaChangeType::EnumValueRemoved,
                ChangeSeverity::Breaking,
                format!("Enum value `{value}` was removed from `{name}`"),
                Some(path),
                meta(&[("enum_name", name), ("value_name", value)]),
            );
        }
    }
    for value in new_values.keys() {
        if !old_values.contains_key(value) {
            let path = format!("{name}.{value}");
            ctx.push(
                SchemaChangeType::EnumValueAdded,
                ChangeSeverity::Dangerous,
                format!("Enum value `{value}` was added to `{name}`"),
                Some(path),
                meta(&[("enum_name", name), ("value_name", value)]),
            );
        }
    }
}

fn diff_union(ctx: &mut DiffContext, name: &str, old: &UnionType, new: &UnionType) {
    let old_members: Vec<&str> = old.members.iter().map(|m| m.node.as_str()).collect();
    let new_members: Vec<&str> = new.members.iter().map(|m| m.node.as_str()).collect();

    let mut removed: Vec<&&str> = old_members
        .iter()
        .filter(|m| !new_members.contains(m))
        .collect();
    removed.sort_unstable();
    for member in removed {
        ctx.push(
            SchemaChangeType::UnionMemberRemoved,
            ChangeSeverity::Breaking,
            format!("Member `{member}` was removed from union `{name}`"),
            Some(name.to_string()),
            meta(&[("union_name", name), ("member_name", member)]),
        );
    }
    let mut added: Vec<&&str> = new_members
        .iter()
        .filter(|m| !old_members.contains(m))
        .collect();
    added.sort_unstable();
    for member in added {
        ctx.push(
            SchemaChangeType::UnionMemberAdded,
            ChangeSeverity::Dangerous,
            format!("Member `{member}` was added to union `{name}`"),
            Some(name.to_string()),
            meta(&[("union_name", name), ("member_name", member)]),
        );
    }
}

fn diff_input(ctx: &mut DiffContext, name: &str, old: &InputObjectType, new: &InputObjectType) {
    let old_fields = input_value_map(&old.fields);
    let new_fields = input_value_map(&new.fields);

    for (field_name, old_field) in &old_fields {
        let path = format!("{name}.{field_name}");
        match new_fields.get(field_name) {
            None => ctx.push(
                SchemaChangeType::InputFieldRemoved,
                ChangeSeverity::Breaking,
                format!("Input field `{path}` was removed"),
                Some(path.clone()),
                meta(&[("input_name", name), ("field_name", field_name)]),
            ),
            Some(new_field) => {
                let old_type = render_type(&old_field.ty.node);
                let new_type = render_type(&new_field.ty.node);
                if old_type != new_type {
                    let severity =
                        if is_safe_input_type_change(&old_field.ty.node, &new_field.ty.node) {
                            ChangeSeverity::Safe
                        } else {
                            ChangeSeverity::Breaking
                        };
                    ctx.push(
                        SchemaChangeType::InputFieldTypeChanged,
                        severity,
                        format!(
                            "Input field `{path}` changed type from `{old_type}` to `{new_type}`"
                        ),
                        Some(path.clone()),
                        meta(&[
                            ("input_name", name),
                            ("field_name", field_name),
                            ("old_type", &old_type),
                            ("new_type", &new_type),
                        ]),
                    );
                }
                let old_default = old_field.default_value.as_ref().map(|d| d.node.to_string());
                let new_default = new_field.default_value.as_ref().map(|d| d.node.to_string());
                if old_default != new_default {
                    ctx.push(
                        SchemaChangeType::InputFieldDefaultChanged,
                        ChangeSeverity::Dangerous,
                        format!("Default value of input field `{path}` changed"),
                        Some(path.clone()),
                        meta(&[
                            ("input_name", name),
                            ("field_name", field_name),
                            ("old_default", old_default.as_deref().unwrap_or("")),
                            ("new_default", new_default.as_deref().unwrap_or("")),
                        ]),
                    );
                }
            }
        }
    }
    for (field_name, new_field) in &new_fields {
        if old_fields.contains_key(field_name) {
            continue;
        }
        let path = format!("{name}.{field_name}");
        let required = is_required_input(&new_field.ty.node, new_field.default_value.is_some());
        let severity = if required {
            ChangeSeverity::Breaking
        } else {
            ChangeSeverity::Safe
        };
        ctx.push(
            SchemaChangeType::InputFieldAdded,
            severity,
            format!(
                "{} input field `{path}` was added",
                if required { "Required" } else { "Optional" }
            ),
            Some(path),
            meta(&[("input_name", name), ("field_name", field_name)]),
        );
    }
}

#[derive(Default)]
struct DiffContext {
    changes: Vec<SchemaChange>,
}

impl DiffContext {
    fn push(
        &mut self,
        change_type: SchemaChangeType,
        severity: ChangeSeverity,
        message: String,
        path: Option<String>,
        meta: BTreeMap<String, String>,
    ) {
        let id = stable_json_hash_hex(&SchemaChange::identity_material(change_type, &meta))
            .unwrap_or_default();
        self.changes.push(SchemaChange {
            id,
            change_type,
            severity,
            message,
            path,
            meta,
            is_safe_based_on_usage: false,
            approval: None,
        });
    }
}

fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn type_map(doc: &ServiceDocument) -> BTreeMap<String, &TypeDefinition> {
    doc.definitions
        .iter()
        .filter_map(|definition| match definition {
            TypeSystemDefinition::Type(def) => {
                Some((def.node.name.node.to_string(), &def.node))
            }
            _ => None,
        })
        .collect()
}

fn directive_map(doc: &ServiceDocument) -> BTreeMap<String, &DirectiveDefinition> {
    doc.definitions
        .iter()
        .filter_map(|definition| match definition {
            TypeSystemDefinition::Directive(def) => {
                Some((def.node.name.node.to_string(), &def.node))
            }
            _ => None,
        })
        .collect()
}

fn field_map(fields: &[Positioned<FieldDefinition>]) -> BTreeMap<String, &FieldDefinition> {
    fields
        .iter()
        .map(|f| (f.node.name.node.to_string(), &f.node))
        .collect()
}

fn input_value_map(
    values: &[Positioned<InputValueDefinition>],
) -> BTreeMap<String, &InputValueDefinition> {
    values
        .iter()
        .map(|v| (v.node.name.node.to_string(), &v.node))
        .collect()
}

fn has_directive(directives: &[Positioned<ConstDirective>], name: &str) -> bool {
    directives.iter().any(|d| d.node.name.node.as_str() == name)
}

const fn kind_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Scalar => "scalar",
        TypeKind::Object(_) => "object",
        TypeKind::Interface(_) => "interface",
        TypeKind::Union(_) => "union",
        TypeKind::Enum(_) => "enum",
        TypeKind::InputObject(_) => "input object",
    }
}

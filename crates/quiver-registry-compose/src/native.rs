// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use async_graphql_parser::types::{
    DirectiveDefinition, SchemaDefinition, ServiceDocument, TypeDefinition, TypeKind,
    TypeSystemDefinition,
};
use async_graphql_parser::{parse_schema, Positioned};
use async_trait::async_trait;

use quiver_registry_core::print::{print_canonical, render_type};
use quiver_registry_model::{CompositionError, ProjectType, ServiceSchema};

use crate::contracts::apply_contract_filter;
use crate::error::OrchestratorError;
use crate::federation::{collect_tags, strip_federation_elements};
use crate::orchestrator::{
    CompositionOptions, CompositionOutcome, ContractCompositionOutcome, Orchestrator,
};

/// In-process composer. Single projects validate one document; composite
/// projects merge the subgraph set, reporting merge conflicts as
/// composition-source errors while still emitting the merged SDL so callers
/// can persist it for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeComposer;

impl NativeComposer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Orchestrator for NativeComposer {
    async fn compose_and_validate(
        &self,
        project_type: ProjectType,
        schemas: &[ServiceSchema],
        options: &CompositionOptions,
    ) -> Result<CompositionOutcome, OrchestratorError> {
        match project_type {
            ProjectType::Single => Ok(compose_single(schemas)),
            ProjectType::Federation => Ok(compose_composite(schemas, options, true)),
            ProjectType::Stitching => Ok(compose_composite(schemas, options, false)),
            other => Err(OrchestratorError::internal(format!(
                "unsupported project type: {other:?}"
            ))),
        }
    }
}

fn compose_single(schemas: &[ServiceSchema]) -> CompositionOutcome {
    let Some(schema) = schemas.first() else {
        return CompositionOutcome {
            errors: vec![CompositionError::composition("no schema to compose")],
            ..CompositionOutcome::default()
        };
    };
    match parse_schema(&schema.sdl) {
        Ok(doc) => CompositionOutcome {
            sdl: Some(print_canonical(&doc)),
            ..CompositionOutcome::default()
        },
        Err(error) => CompositionOutcome {
            errors: vec![CompositionError::graphql(error.to_string())],
            ..CompositionOutcome::default()
        },
    }
}

fn compose_composite(
    schemas: &[ServiceSchema],
    options: &CompositionOptions,
    federation: bool,
) -> CompositionOutcome {
    let mut parse_errors: Vec<CompositionError> = Vec::new();
    let mut parsed: Vec<(&ServiceSchema, ServiceDocument)> = Vec::new();
    let mut ordered: Vec<&ServiceSchema> = schemas.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    for schema in ordered {
        match parse_schema(&schema.sdl) {
            Ok(mut doc) => {
                if federation {
                    strip_federation_elements(&mut doc);
                }
                parsed.push((schema, doc));
            }
            Err(error) => {
                parse_errors.push(CompositionError::graphql(format!(
                    "[{}] {error}",
                    schema.name
                )));
            }
        }
    }

    if !parse_errors.is_empty() {
        return CompositionOutcome {
            errors: parse_errors,
            ..CompositionOutcome::default()
        };
    }

    let mut accumulator = MergeAccumulator::default();
    for (schema, doc) in &parsed {
        accumulator.merge_document(&schema.name, doc);
    }

    let merged = accumulator.into_document();
    let tags = collect_tags(&merged.document);
    let sdl = print_canonical(&merged.document);
    let supergraph = federation.then(|| {
        let mut header = String::from("# supergraph\n");
        for (schema, _) in &parsed {
            header.push_str(&format!("# subgraph: {}", schema.name));
            if let Some(url) = &schema.url {
                header.push_str(&format!(" url: {url}"));
            }
            header.push('\n');
        }
        header.push_str(&sdl);
        header
    });

    let contracts = options.contracts.as_ref().map(|inputs| {
        inputs
            .iter()
            .map(|input| {
                let filtered = apply_contract_filter(&merged.document, &input.filter);
                match filtered {
                    Ok(doc) => {
                        let contract_sdl = print_canonical(&doc);
                        ContractCompositionOutcome {
                            id: input.id,
                            name: input.name.clone(),
                            supergraph: federation.then(|| contract_sdl.clone()),
                            sdl: Some(contract_sdl),
                            errors: Vec::new(),
                        }
                    }
                    Err(message) => ContractCompositionOutcome {
                        id: input.id,
                        name: input.name.clone(),
                        sdl: None,
                        supergraph: None,
                        errors: vec![CompositionError::composition(message)],
                    },
                }
            })
            .collect()
    });

    // The legacy shape on merge conflicts: errors and SDL together.
    CompositionOutcome {
        sdl: Some(sdl),
        supergraph,
        tags: Some(tags),
        errors: merged.errors,
        contracts,
    }
}

#[derive(Default)]
struct MergeAccumulator {
    schema_def: Option<Positioned<SchemaDefinition>>,
    directives: BTreeMap<String, Positioned<DirectiveDefinition>>,
    types: BTreeMap<String, MergedType>,
    errors: Vec<CompositionError>,
}

struct MergedType {
    first_service: String,
    definition: Positioned<TypeDefinition>,
}

struct MergedDocument {
    document: ServiceDocument,
    errors: Vec<CompositionError>,
}

impl MergeAccumulator {
    fn merge_document(&mut self, service: &str, doc: &ServiceDocument) {
        for definition in &doc.definitions {
            match definition {
                TypeSystemDefinition::Schema(def) => {
                    if self.schema_def.is_none() {
                        self.schema_def = Some(def.clone());
                    }
                }
                TypeSystemDefinition::Directive(def) => {
                    self.directives
                        .entry(def.node.name.node.to_string())
                        .or_insert_with(|| def.clone());
                }
                TypeSystemDefinition::Type(def) => {
                    self.merge_type(service, def);
                }
            }
        }
    }

    fn merge_type(&mut self, service: &str, incoming: &Positioned<TypeDefinition>) {
        let name = incoming.node.name.node.to_string();
        let Some(existing) = self.types.get_mut(&name) else {
            self.types.insert(
                name,
                MergedType {
                    first_service: service.to_string(),
                    definition: incoming.clone(),
                },
            );
            return;
        };

        let first_service = existing.first_service.clone();
        let mut conflicts: Vec<CompositionError> = Vec::new();
        match (&mut existing.definition.node.kind, &incoming.node.kind) {
            (TypeKind::Object(current), TypeKind::Object(new)) => {
                for implemented in &new.implements {
                    if !current
                        .implements
                        .iter()
                        .any(|i| i.node == implemented.node)
                    {
                        current.implements.push(implemented.clone());
                    }
                }
                for field in &new.fields {
                    let field_name = field.node.name.node.as_str();
                    match current
                        .fields
                        .iter()
                        .find(|f| f.node.name.node.as_str() == field_name)
                    {
                        Some(present) => {
                            let current_ty = render_type(&present.node.ty.node);
                            let incoming_ty = render_type(&field.node.ty.node);
                            if current_ty != incoming_ty {
                                conflicts.push(CompositionError::composition(format!(
                                    "Field \"{name}.{field_name}\" has conflicting types \
                                     \"{current_ty}\" (service \"{first_service}\") and \
                                     \"{incoming_ty}\" (service \"{service}\")"
                                )));
                            }
                        }
                        None => current.fields.push(field.clone()),
                    }
                }
            }
            (TypeKind::Interface(current), TypeKind::Interface(new)) => {
                for implemented in &new.implements {
                    if !current
                        .implements
                        .iter()
                        .any(|i| i.node == implemented.node)
                    {
                        current.implements.push(implemented.clone());
                    }
                }
                for field in &new.fields {
                    let field_name = field.node.name.node.as_str();
                    match current
                        .fields
                        .iter()
                        .find(|f| f.node.name.node.as_str() == field_name)
                    {
                        Some(present) => {
                            let current_ty = render_type(&present.node.ty.node);
                            let incoming_ty = render_type(&field.node.ty.node);
                            if current_ty != incoming_ty {
                                conflicts.push(CompositionError::composition(format!(
                                    "Field \"{name}.{field_name}\" has conflicting types \
                                     \"{current_ty}\" (service \"{first_service}\") and \
                                     \"{incoming_ty}\" (service \"{service}\")"
                                )));
                            }
                        }
                        None => current.fields.push(field.clone()),
                    }
                }
            }
            (TypeKind::Enum(current), TypeKind::Enum(new)) => {
                for value in &new.values {
                    if !current
                        .values
                        .iter()
                        .any(|v| v.node.value.node == value.node.value.node)
                    {
                        current.values.push(value.clone());
                    }
                }
            }
            (TypeKind::Union(current), TypeKind::Union(new)) => {
                for member in &new.members {
                    if !current.members.iter().any(|m| m.node == member.node) {
                        current.members.push(member.clone());
                    }
                }
            }
            (TypeKind::InputObject(current), TypeKind::InputObject(new)) => {
                for field in &new.fields {
                    let field_name = field.node.name.node.as_str();
                    match current
                        .fields
                        .iter()
                        .find(|f| f.node.name.node.as_str() == field_name)
                    {
                        Some(present) => {
                            let current_ty = render_type(&present.node.ty.node);
                            let incoming_ty = render_type(&field.node.ty.node);
                            if current_ty != incoming_ty {
                                conflicts.push(CompositionError::composition(format!(
                                    "Input field \"{name}.{field_name}\" has conflicting types \
                                     \"{current_ty}\" (service \"{first_service}\") and \
                                     \"{incoming_ty}\" (service \"{service}\")"
                                )));
                            }
                        }
                        None => current.fields.push(field.clone()),
                    }
                }
            }
            (TypeKind::Scalar, TypeKind::Scalar) => {}
            (current, new) => {
                conflicts.push(CompositionError::composition(format!(
                    "Type \"{name}\" is a {} in service \"{first_service}\" but a {} in \
                     service \"{service}\"",
                    kind_name(current),
                    kind_name(new)
                )));
            }
        }
        self.errors.extend(conflicts);
    }

    fn into_document(self) -> MergedDocument {
        let mut definitions: Vec<TypeSystemDefinition> = Vec::new();
        if let Some(schema_def) = self.schema_def {
            definitions.push(TypeSystemDefinition::Schema(schema_def));
        }
        for (_, directive) in self.directives {
            definitions.push(TypeSystemDefinition::Directive(directive));
        }
        for (_, merged) in self.types {
            definitions.push(TypeSystemDefinition::Type(merged.definition));
        }
        MergedDocument {
            document: ServiceDocument { definitions },
            errors: self.errors,
        }
    }
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

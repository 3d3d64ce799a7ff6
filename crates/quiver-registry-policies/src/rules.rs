// SPDX-License-Identifier: Apache-2.0

use async_graphql_parser::parse_schema;
use async_graphql_parser::types::{TypeKind, TypeSystemDefinition};
use async_trait::async_trait;

use quiver_registry_model::{PolicySeverity, SchemaPolicyIssue, TargetId};

use crate::engine::{PolicyEngine, PolicyEngineError, PolicyOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    TypeNamesPascalCase,
    FieldNamesCamelCase,
    EnumValuesUpperSnakeCase,
    TypesHaveDescriptions,
    DeprecationsHaveReasons,
}

#[derive(Debug, Clone, Copy)]
struct RuleSpec {
    id: &'static str,
    severity: PolicySeverity,
    message: &'static str,
    kind: RuleKind,
}

const POLICY_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "policy.naming.type_pascal_case",
        severity: PolicySeverity::Error,
        message: "type names must be PascalCase",
        kind: RuleKind::TypeNamesPascalCase,
    },
    RuleSpec {
        id: "policy.naming.field_camel_case",
        severity: PolicySeverity::Error,
        message: "field names must be camelCase",
        kind: RuleKind::FieldNamesCamelCase,
    },
    RuleSpec {
        id: "policy.naming.enum_value_upper_snake_case",
        severity: PolicySeverity::Warning,
        message: "enum values must be UPPER_SNAKE_CASE",
        kind: RuleKind::EnumValuesUpperSnakeCase,
    },
    RuleSpec {
        id: "policy.docs.type_description_required",
        severity: PolicySeverity::Warning,
        message: "types should carry a description",
        kind: RuleKind::TypesHaveDescriptions,
    },
    RuleSpec {
        id: "policy.lifecycle.deprecation_reason_required",
        severity: PolicySeverity::Warning,
        message: "deprecations should state a reason",
        kind: RuleKind::DeprecationsHaveReasons,
    },
];

/// The built-in rule-table engine. Rules run over the pushed document only,
/// so a push is never failed for surface it did not touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulePolicyEngine;

impl RulePolicyEngine {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyEngine for RulePolicyEngine {
    async fn check_policy(
        &self,
        _target_id: &TargetId,
        _sdl: &str,
        modified_sdl: &str,
    ) -> Result<PolicyOutcome, PolicyEngineError> {
        let doc = match parse_schema(modified_sdl) {
            Ok(doc) => doc,
            // Composition already reports syntax problems; policy stays quiet.
            Err(_) => return Ok(PolicyOutcome::default()),
        };

        let mut outcome = PolicyOutcome::default();
        for rule in POLICY_RULES {
            for finding in apply_rule(*rule, &doc) {
                match rule.severity {
                    PolicySeverity::Warning => outcome.warnings.push(finding),
                    PolicySeverity::Error => outcome.errors.push(finding),
                    _ => outcome.errors.push(finding),
                }
            }
        }
        Ok(outcome)
    }
}

fn apply_rule(
    rule: RuleSpec,
    doc: &async_graphql_parser::types::ServiceDocument,
) -> Vec<SchemaPolicyIssue> {
    let mut findings = Vec::new();
    let mut report = |coordinate: String| {
        findings.push(SchemaPolicyIssue {
            rule_id: rule.id.to_string(),
            severity: rule.severity,
            message: rule.message.to_string(),
            coordinate: Some(coordinate),
        });
    };

    for definition in &doc.definitions {
        let TypeSystemDefinition::Type(def) = definition else {
            continue;
        };
        let type_name = def.node.name.node.as_str();
        if is_introspection_name(type_name) {
            continue;
        }

        match rule.kind {
            RuleKind::TypeNamesPascalCase => {
                if !is_pascal_case(type_name) {
                    report(type_name.to_string());
                }
            }
            RuleKind::TypesHaveDescriptions => {
                if def.node.description.is_none() {
                    report(type_name.to_string());
                }
            }
            RuleKind::FieldNamesCamelCase => match &def.node.kind {
                TypeKind::Object(object) => {
                    for field in &object.fields {
                        let field_name = field.node.name.node.as_str();
                        if !is_camel_case(field_name) {
                            report(format!("{type_name}.{field_name}"));
                        }
                    }
                }
                TypeKind::Interface(interface) => {
                    for field in &interface.fields {
                        let field_name = field.node.name.node.as_str();
                        if !is_camel_case(field_name) {
                            report(format!("{type_name}.{field_name}"));
                        }
                    }
                }
                _ => {}
            },
            RuleKind::EnumValuesUpperSnakeCase => {
                if let TypeKind::Enum(enumeration) = &def.node.kind {
                    for value in &enumeration.values {
                        let value_name = value.node.value.node.as_str();
                        if !is_upper_snake_case(value_name) {
                            report(format!("{type_name}.{value_name}"));
                        }
                    }
                }
            }
            RuleKind::DeprecationsHaveReasons => {
                if let TypeKind::Object(object) = &def.node.kind {
                    for field in &object.fields {
                        for directive in &field.node.directives {
                            if directive.node.name.node.as_str() != "deprecated" {
                                continue;
                            }
                            let has_reason = directive
                                .node
                                .arguments
                                .iter()
                                .any(|(name, _)| name.node.as_str() == "reason");
                            if !has_reason {
                                report(format!("{type_name}.{}", field.node.name.node));
                            }
                        }
                    }
                }
            }
        }
    }

    findings
}

fn is_introspection_name(name: &str) -> bool {
    name.starts_with("__")
}

fn is_pascal_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_camel_case(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_upper_snake_case(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

// SPDX-License-Identifier: Apache-2.0

//! Delegated composition over HTTP. The request body is HMAC-SHA256 signed
//! with the project's configured secret; the endpoint answers in the same
//! outcome shape the native composer produces. Transport failures surface
//! as `OrchestratorError::Unavailable` and are retried by the caller, never
//! here.

use std::str::FromStr;

use async_graphql_parser::parse_schema;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use quiver_registry_core::print::print_canonical;
use quiver_registry_model::{
    CompositionError, ContractId, ProjectType, ServiceSchema,
};

use crate::contracts::apply_contract_filter;
use crate::error::OrchestratorError;
use crate::orchestrator::{
    CompositionOptions, CompositionOutcome, ContractCompositionOutcome, ContractInput,
    Orchestrator,
};

pub const SIGNATURE_HEADER: &str = "x-hive-signature";

#[derive(Debug, Clone)]
pub struct ExternalComposer {
    client: reqwest::Client,
}

impl Default for ExternalComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalComposer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct WireSchema<'a> {
    name: &'a str,
    sdl: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    schemas: Vec<WireSchema<'a>>,
    #[serde(rename = "type")]
    project_type: &'a str,
}

#[derive(Clone, Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Deserialize)]
struct WireContract {
    id: String,
    #[serde(default)]
    sdl: Option<String>,
    #[serde(default)]
    supergraph: Option<String>,
    #[serde(default)]
    errors: Option<Vec<WireError>>,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    sdl: Option<String>,
    #[serde(default)]
    supergraph: Option<String>,
    #[serde(default)]
    errors: Option<Vec<WireError>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    contracts: Option<Vec<WireContract>>,
}

fn decode_error(wire: WireError) -> CompositionError {
    match wire.source.as_deref() {
        Some("graphql") => CompositionError::graphql(wire.message),
        _ => CompositionError::composition(wire.message),
    }
}

#[must_use]
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{byte:02x}");
    }
    Some(out)
}

#[async_trait]
impl Orchestrator for ExternalComposer {
    async fn compose_and_validate(
        &self,
        project_type: ProjectType,
        schemas: &[ServiceSchema],
        options: &CompositionOptions,
    ) -> Result<CompositionOutcome, OrchestratorError> {
        let Some(external) = options.external.as_ref() else {
            return Err(OrchestratorError::internal(
                "external composer invoked without an endpoint configuration",
            ));
        };

        let request = WireRequest {
            schemas: schemas
                .iter()
                .map(|s| WireSchema {
                    name: &s.name,
                    sdl: &s.sdl,
                    url: s.url.as_deref(),
                })
                .collect(),
            project_type: project_type.as_str(),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| OrchestratorError::internal(format!("request encoding failed: {e}")))?;
        let signature = sign_body(&external.secret, &body)
            .ok_or_else(|| OrchestratorError::internal("request signing failed"))?;

        let response = self
            .client
            .post(&external.endpoint)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| OrchestratorError::unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::unavailable(format!(
                "external composer answered {status}"
            )));
        }
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::unavailable(format!("undecodable response: {e}")))?;

        let mut outcome = CompositionOutcome {
            sdl: wire.sdl,
            supergraph: wire.supergraph,
            tags: wire.tags,
            errors: wire
                .errors
                .unwrap_or_default()
                .into_iter()
                .map(decode_error)
                .collect(),
            contracts: None,
        };

        if let Some(inputs) = options.contracts.as_ref() {
            let remote = wire.contracts.unwrap_or_default();
            outcome.contracts = Some(resolve_contracts(inputs, remote, outcome.sdl.as_deref()));
        }

        Ok(outcome)
    }
}

/// Prefer per-contract results the endpoint returned; fall back to filtering
/// the returned composite document locally for contracts it did not answer.
fn resolve_contracts(
    inputs: &[ContractInput],
    remote: Vec<WireContract>,
    composed_sdl: Option<&str>,
) -> Vec<ContractCompositionOutcome> {
    inputs
        .iter()
        .map(|input| {
            let answered = remote.iter().find(|c| {
                ContractId::from_str(&c.id).is_ok_and(|id| id == input.id)
            });
            if let Some(contract) = answered {
                return ContractCompositionOutcome {
                    id: input.id,
                    name: input.name.clone(),
                    sdl: contract.sdl.clone(),
                    supergraph: contract.supergraph.clone(),
                    errors: contract
                        .errors
                        .clone()
                        .map(|errors| {
                            errors
                                .into_iter()
                                .map(|e| match e.source.as_deref() {
                                    Some("graphql") => CompositionError::graphql(e.message),
                                    _ => CompositionError::composition(e.message),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                };
            }

            let filtered = composed_sdl
                .and_then(|sdl| parse_schema(sdl).ok())
                .map(|doc| apply_contract_filter(&doc, &input.filter));
            match filtered {
                Some(Ok(doc)) => {
                    let sdl = print_canonical(&doc);
                    ContractCompositionOutcome {
                        id: input.id,
                        name: input.name.clone(),
                        supergraph: Some(sdl.clone()),
                        sdl: Some(sdl),
                        errors: Vec::new(),
                    }
                }
                Some(Err(message)) => ContractCompositionOutcome {
                    id: input.id,
                    name: input.name.clone(),
                    sdl: None,
                    supergraph: None,
                    errors: vec![CompositionError::composition(message)],
                },
                None => {
                    warn!(contract = %input.name, "no composite sdl to derive contract from");
                    ContractCompositionOutcome {
                        id: input.id,
                        name: input.name.clone(),
                        sdl: None,
                        supergraph: None,
                        errors: vec![CompositionError::composition(
                            "external composer returned no sdl to derive the contract from",
                        )],
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex() {
        let signature =
            sign_body("secret", br#"{"schemas":[],"type":"federation"}"#).expect("sign");
        assert_eq!(signature.len(), 64);
        assert_eq!(
            Some(signature.clone()),
            sign_body("secret", br#"{"schemas":[],"type":"federation"}"#)
        );
        assert_ne!(
            Some(signature),
            sign_body("other", br#"{"schemas":[],"type":"federation"}"#)
        );
    }

    #[test]
    fn wire_errors_partition_by_source() {
        let graphql = decode_error(WireError {
            message: "bad syntax".to_string(),
            source: Some("graphql".to_string()),
        });
        assert_eq!(graphql.source, quiver_registry_model::CompositionErrorSource::Graphql);

        let composition = decode_error(WireError {
            message: "conflict".to_string(),
            source: None,
        });
        assert_eq!(
            composition.source,
            quiver_registry_model::CompositionErrorSource::Composition
        );
    }
}

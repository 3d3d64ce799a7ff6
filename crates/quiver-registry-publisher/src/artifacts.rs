// SPDX-License-Identifier: Apache-2.0

//! CDN artifact emission for a committed version. On publish this runs
//! inside the storage transaction's action hook, so a committed version
//! implies durable artifacts and a failed write rolls the version back.

use serde_json::{json, Value};

use quiver_registry_model::{ContractPublishState, ProjectType, SchemaVersion, SchemaVersionContract};
use quiver_registry_store::{ArtifactKey, ArtifactKind, ArtifactStoreBackend};

/// The slice of a contract outcome the CDN cares about.
#[derive(Debug, Clone)]
pub(crate) struct ContractArtifacts {
    pub name: String,
    pub is_composable: bool,
    pub sdl: Option<String>,
    pub supergraph: Option<String>,
}

impl From<&ContractPublishState> for ContractArtifacts {
    fn from(state: &ContractPublishState) -> Self {
        Self {
            name: state.contract_name.clone(),
            is_composable: state.is_composable,
            sdl: state.composite_schema_sdl.clone(),
            supergraph: state.supergraph_sdl.clone(),
        }
    }
}

impl From<&SchemaVersionContract> for ContractArtifacts {
    fn from(record: &SchemaVersionContract) -> Self {
        Self {
            name: record.contract_name.clone(),
            is_composable: record.is_composable,
            sdl: record.composite_schema_sdl.clone(),
            supergraph: record.supergraph_sdl.clone(),
        }
    }
}

/// Write every artifact the version carries. Non-composable versions keep
/// the previous artifacts in place, so callers only invoke this for
/// composable ones.
pub(crate) fn publish_version_artifacts(
    store: &dyn ArtifactStoreBackend,
    project_type: ProjectType,
    version: &SchemaVersion,
    contracts: &[ContractArtifacts],
) -> Result<(), String> {
    let target = version.target_id.clone();
    let put = |key: ArtifactKey, bytes: &[u8]| {
        store.put(&key, bytes).map_err(|e| e.to_string())
    };

    if let Some(sdl) = &version.composite_schema_sdl {
        put(
            ArtifactKey::target(target.clone(), ArtifactKind::Sdl),
            sdl.as_bytes(),
        )?;
    }

    let services: Vec<Value> = version
        .schemas
        .iter()
        .map(|push| {
            json!({
                "name": push.service_name,
                "sdl": push.sdl,
                "url": push.service_url,
            })
        })
        .collect();
    put(
        ArtifactKey::target(target.clone(), ArtifactKind::Services),
        &serde_json::to_vec(&services).map_err(|e| e.to_string())?,
    )?;

    if let Some(supergraph) = &version.supergraph_sdl {
        put(
            ArtifactKey::target(target.clone(), ArtifactKind::Supergraph),
            supergraph.as_bytes(),
        )?;
    }

    if let Some(metadata) = metadata_artifact(project_type, version) {
        put(
            ArtifactKey::target(target.clone(), ArtifactKind::Metadata),
            &serde_json::to_vec(&metadata).map_err(|e| e.to_string())?,
        )?;
    }

    for contract in contracts {
        if !contract.is_composable {
            continue;
        }
        if let Some(sdl) = &contract.sdl {
            put(
                ArtifactKey::contract(target.clone(), contract.name.clone(), ArtifactKind::Sdl),
                sdl.as_bytes(),
            )?;
        }
        if let Some(supergraph) = &contract.supergraph {
            put(
                ArtifactKey::contract(
                    target.clone(),
                    contract.name.clone(),
                    ArtifactKind::Supergraph,
                ),
                supergraph.as_bytes(),
            )?;
        }
    }

    Ok(())
}

/// Single projects publish their one metadata object as-is; composite
/// projects publish the array of per-service metadata.
fn metadata_artifact(project_type: ProjectType, version: &SchemaVersion) -> Option<Value> {
    if project_type.is_composite() {
        let entries: Vec<Value> = version
            .schemas
            .iter()
            .filter_map(|push| push.metadata.clone())
            .collect();
        (!entries.is_empty()).then_some(Value::Array(entries))
    } else {
        version.schemas.first().and_then(|push| push.metadata.clone())
    }
}

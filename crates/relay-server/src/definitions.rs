//! Startup loading of workflow definitions
//!
//! Definitions live in a JSON document (`{"workflows": [...]}`) loaded
//! once when the server boots. Every definition is structurally validated
//! before it is admitted; a single invalid definition aborts startup
//! rather than serving a workflow that cannot run to completion.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::error::{ServerError, ServerResult};
use relay_core::{DefinitionRepository, WorkflowDefinition};

/// On-disk shape of the definitions file
#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    workflows: Vec<WorkflowDefinition>,
}

/// Load, validate, and store every definition from `path`
///
/// Returns the number of definitions loaded.
pub async fn load_definitions(
    path: &Path,
    repository: &dyn DefinitionRepository,
) -> ServerResult<usize> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
        ServerError::Config(format!(
            "Failed to read definitions file {}: {}",
            path.display(),
            err
        ))
    })?;

    let file: DefinitionsFile = serde_json::from_str(&raw).map_err(|err| {
        ServerError::Config(format!(
            "Failed to parse definitions file {}: {}",
            path.display(),
            err
        ))
    })?;

    for definition in &file.workflows {
        definition.validate()?;
        repository.save(definition).await?;
        info!(
            workflow_id = %definition.id.0,
            version = %definition.version,
            "loaded workflow definition"
        );
    }

    Ok(file.workflows.len())
}

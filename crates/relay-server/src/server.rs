//! The Relay server
//!
//! Owns the runner and its repositories and serves the HTTP API.

use std::sync::Arc;
use tracing::info;

use crate::api;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use relay_core::{
    DefinitionRepository, InstanceRepository, WorkflowDefinition, WorkflowId, WorkflowRunner,
};

/// The main application server
pub struct RelayServer {
    /// Server configuration
    config: ServerConfig,

    /// The workflow state machine
    runner: WorkflowRunner,

    /// Definition repository, also used directly by read-only routes
    definitions: Arc<dyn DefinitionRepository>,
}

impl RelayServer {
    /// Create a new server over the given repositories
    pub fn new(
        config: ServerConfig,
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
    ) -> Self {
        let runner = WorkflowRunner::new(definitions.clone(), instances);
        Self {
            config,
            runner,
            definitions,
        }
    }

    /// The workflow runner
    pub fn runner(&self) -> &WorkflowRunner {
        &self.runner
    }

    /// The server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// All loaded workflow definitions
    pub async fn list_definitions(&self) -> ServerResult<Vec<WorkflowDefinition>> {
        Ok(self.definitions.find_all().await?)
    }

    /// One workflow definition by id
    pub async fn get_definition(&self, id: &WorkflowId) -> ServerResult<WorkflowDefinition> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("Workflow {}", id.0)))
    }

    /// Bind and serve until shutdown
    pub async fn run(self) -> ServerResult<()> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| ServerError::Internal(format!("Failed to bind {}: {}", addr, err)))?;

        info!("Relay server listening on {}", addr);

        let router = api::build_router(Arc::new(self));
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| ServerError::Internal(format!("Server error: {}", err)))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

//! In-memory state store implementation for Relay
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the relay-core crate. It is primarily useful for
//! development, testing, and single-process deployments where durable
//! persistence is not required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{InMemoryDefinitionRepository, InMemoryInstanceRepository};


use relay_core::{DefinitionRepository, InstanceRepository, WorkflowDefinition, WorkflowInstance};

/// Provider for in-memory repositories over shared storage
///
/// Multiple repository handles created from one provider see the same
/// underlying maps, which lets a server and its background readers share
/// state without a database.
pub struct InMemoryStateStore {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
}

impl InMemoryStateStore {
    /// Create a new in-memory state store
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create repository handles over this store's shared storage
    pub fn create_repositories(
        &self,
    ) -> (Arc<dyn DefinitionRepository>, Arc<dyn InstanceRepository>) {
        let definition_repo: Arc<dyn DefinitionRepository> =
            Arc::new(InMemoryDefinitionRepository::with_shared(self.definitions.clone()));
        let instance_repo: Arc<dyn InstanceRepository> =
            Arc::new(InMemoryInstanceRepository::with_shared(self.instances.clone()));
        (definition_repo, instance_repo)
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

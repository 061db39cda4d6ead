//! In-memory repository implementations
//!
//! Storage is a `tokio::sync::RwLock` over a plain map. The instance
//! repository performs its version check inside the write lock, which
//! gives the compare-and-swap the runner relies on for concurrent
//! submissions of the same step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use relay_core::{
    CoreError, DefinitionRepository, InstanceFilter, InstanceId, InstancePage, InstanceRepository,
    WorkflowDefinition, WorkflowId, WorkflowInstance,
};

/// Default page size for instance listings
const DEFAULT_LIST_LIMIT: usize = 100;

/// In-memory implementation of the definition repository
pub struct InMemoryDefinitionRepository {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryDefinitionRepository {
    /// Create a new empty definition repository
    pub fn new() -> Self {
        Self {
            definitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository over shared storage
    pub fn with_shared(definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>) -> Self {
        Self { definitions }
    }
}

impl Default for InMemoryDefinitionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(&id.0).cloned())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id.0.clone(), definition.clone());
        debug!(workflow_id = %definition.id.0, "saved workflow definition");
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError> {
        let definitions = self.definitions.read().await;
        let mut all: Vec<WorkflowDefinition> = definitions.values().cloned().collect();
        all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(all)
    }
}

/// In-memory implementation of the instance repository
pub struct InMemoryInstanceRepository {
    instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>,
}

impl InMemoryInstanceRepository {
    /// Create a new empty instance repository
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository over shared storage
    pub fn with_shared(instances: Arc<RwLock<HashMap<String, WorkflowInstance>>>) -> Self {
        Self { instances }
    }
}

impl Default for InMemoryInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an instance's current pending step is assigned to `email`
fn pending_assigned_to(instance: &WorkflowInstance, email: &str) -> bool {
    !instance.is_terminal()
        && instance
            .pending_record()
            .and_then(|record| record.assigned_to_email.as_deref())
            .map_or(false, |assigned| assigned.eq_ignore_ascii_case(email))
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, CoreError> {
        let instances = self.instances.read().await;
        Ok(instances.get(&id.0).cloned())
    }

    async fn create(&self, instance: &WorkflowInstance) -> Result<(), CoreError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.instance_id.0) {
            return Err(CoreError::Store(format!(
                "instance already exists: {}",
                instance.instance_id.0
            )));
        }
        instances.insert(instance.instance_id.0.clone(), instance.clone());
        debug!(instance_id = %instance.instance_id.0, "created workflow instance");
        Ok(())
    }

    async fn update(
        &self,
        instance: &WorkflowInstance,
        expected_version: u64,
    ) -> Result<(), CoreError> {
        let mut instances = self.instances.write().await;
        let stored = instances
            .get(&instance.instance_id.0)
            .ok_or_else(|| CoreError::InstanceNotFound(instance.instance_id.0.clone()))?;

        if stored.version != expected_version {
            debug!(
                instance_id = %instance.instance_id.0,
                stored = stored.version,
                expected = expected_version,
                "rejected stale instance update"
            );
            return Err(CoreError::Conflict(instance.instance_id.0.clone()));
        }

        instances.insert(instance.instance_id.0.clone(), instance.clone());
        Ok(())
    }

    async fn list(&self, filter: &InstanceFilter) -> Result<InstancePage, CoreError> {
        let instances = self.instances.read().await;

        let mut matching: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| filter.status.map_or(true, |status| i.status == status))
            .filter(|i| {
                filter.initiated_by.as_deref().map_or(true, |email| {
                    i.initiated_by_email.eq_ignore_ascii_case(email)
                })
            })
            .filter(|i| {
                filter
                    .assigned_to
                    .as_deref()
                    .map_or(true, |email| pending_assigned_to(i, email))
            })
            .cloned()
            .collect();

        // Newest first
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total_count = matching.len();
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let instances = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .collect();

        Ok(InstancePage {
            instances,
            total_count,
        })
    }

    async fn find_pending_for(
        &self,
        user_email: &str,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        let instances = self.instances.read().await;
        let mut pending: Vec<WorkflowInstance> = instances
            .values()
            .filter(|i| pending_assigned_to(i, user_email))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pending)
    }
}

//! Repository traits for the Relay engine
//!
//! The runner owns no storage: definitions and instances live behind these
//! traits so the state machine can be exercised against in-memory fakes and
//! deployed against any durable store.

use async_trait::async_trait;

use super::workflow_definition::WorkflowDefinition;
use super::workflow_instance::{InstanceId, InstanceStatus, WorkflowId, WorkflowInstance};
use crate::CoreError;

/// Filters for instance listing
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    /// Only instances with this status
    pub status: Option<InstanceStatus>,

    /// Only instances started by this email
    pub initiated_by: Option<String>,

    /// Only instances whose current pending step is assigned to this email
    pub assigned_to: Option<String>,

    /// Page size; `None` means the store's default
    pub limit: Option<usize>,

    /// Page offset
    pub offset: usize,
}

/// One page of instance listing results
#[derive(Debug, Clone)]
pub struct InstancePage {
    /// Instances on this page, newest first
    pub instances: Vec<WorkflowInstance>,

    /// Total matching instances across all pages
    pub total_count: usize,
}

/// Repository for workflow definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Find a definition by ID
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, CoreError>;

    /// Save a definition
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError>;

    /// Get all definitions
    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError>;
}

/// Repository for workflow instances
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Find an instance by ID
    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, CoreError>;

    /// Persist a newly created instance
    async fn create(&self, instance: &WorkflowInstance) -> Result<(), CoreError>;

    /// Persist an updated instance, compare-and-swap on its version
    ///
    /// `expected_version` is the version the caller loaded; the store must
    /// fail with `CoreError::Conflict` when the stored version differs, so
    /// concurrent submissions of the same step never both win.
    async fn update(
        &self,
        instance: &WorkflowInstance,
        expected_version: u64,
    ) -> Result<(), CoreError>;

    /// List instances with filtering and pagination
    async fn list(&self, filter: &InstanceFilter) -> Result<InstancePage, CoreError>;

    /// Instances whose current pending step is assigned to `user_email`
    async fn find_pending_for(&self, user_email: &str)
        -> Result<Vec<WorkflowInstance>, CoreError>;
}

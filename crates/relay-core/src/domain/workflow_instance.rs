use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Workflow definition ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

/// Value object: Workflow instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

/// Value object: Step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance was created and is resting on its first real step
    Started,

    /// At least one step has been submitted
    InProgress,

    /// Instance reached an end step
    Completed,

    /// Instance was cancelled by an administrative action
    Cancelled,
}

impl InstanceStatus {
    /// Terminal states are absorbing: no further mutation is permitted
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Cancelled)
    }

    /// Parse a wire-format status string (`started`, `in_progress`, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(InstanceStatus::Started),
            "in_progress" => Some(InstanceStatus::InProgress),
            "completed" => Some(InstanceStatus::Completed),
            "cancelled" => Some(InstanceStatus::Cancelled),
            _ => None,
        }
    }
}

/// Status of a single step within an instance's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepRecordStatus {
    /// Step is the instance's current step, waiting for its assignee
    Pending,

    /// Step was submitted and accepted
    Completed,

    /// Step was bypassed (only happens on cancellation)
    Skipped,
}

/// One entry in an instance's ordered step history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The definition step this entry tracks
    pub step_id: StepId,

    /// Denormalized step name for display without a definition lookup
    pub step_name: String,

    /// Execution status of this step
    pub status: StepRecordStatus,

    /// Resolved assignee, if the step declared one
    pub assigned_to_email: Option<String>,

    /// Who actually submitted (or skipped) the step
    pub executed_by_email: Option<String>,

    /// When the step became the current step
    pub started_at: Option<DateTime<Utc>>,

    /// When the step was completed or skipped
    pub completed_at: Option<DateTime<Utc>>,

    /// When this history entry was created
    pub created_at: DateTime<Utc>,
}

/// Aggregate: one running or finished execution of a workflow definition
///
/// Invariant: while the instance is non-terminal, exactly one record in
/// `steps` is `Pending` and its id equals `current_step_id`. Terminal
/// instances have `current_step_id = None` and no pending records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier
    pub instance_id: InstanceId,

    /// Definition this instance executes
    pub workflow_id: WorkflowId,

    /// Denormalized definition name
    pub workflow_name: String,

    /// The step currently waiting for input, `None` once terminal
    pub current_step_id: Option<StepId>,

    /// Lifecycle status
    pub status: InstanceStatus,

    /// Email of the user who started the instance
    pub initiated_by_email: String,

    /// Identity-provider id of the user who started the instance
    pub initiated_by_user_id: String,

    /// Accumulated form data, merged across all submitted steps
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,

    /// Ordered step history
    pub steps: Vec<StepRecord>,

    /// Optimistic concurrency counter, bumped on every persisted update
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,

    /// Set when the instance reaches a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a new instance for a definition, with an empty history
    pub fn new(
        workflow_id: WorkflowId,
        workflow_name: String,
        initiated_by_email: String,
        initiated_by_user_id: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            instance_id: InstanceId(Uuid::new_v4().to_string()),
            workflow_id,
            workflow_name,
            current_step_id: None,
            status: InstanceStatus::Started,
            initiated_by_email,
            initiated_by_user_id,
            data: serde_json::Map::new(),
            steps: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the instance is completed or cancelled
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The single pending history record, if the instance is still running
    pub fn pending_record(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|r| r.status == StepRecordStatus::Pending)
    }

    /// Whether a step already has a completed history record
    pub fn has_completed(&self, step_id: &StepId) -> bool {
        self.steps
            .iter()
            .any(|r| &r.step_id == step_id && r.status == StepRecordStatus::Completed)
    }

    /// Record an already-completed step (used for the synthetic start node)
    pub fn record_completed(&mut self, step_id: StepId, step_name: String, executed_by: &str) {
        let now = Utc::now();
        self.steps.push(StepRecord {
            step_id,
            step_name,
            status: StepRecordStatus::Completed,
            assigned_to_email: None,
            executed_by_email: Some(executed_by.to_string()),
            started_at: Some(now),
            completed_at: Some(now),
            created_at: now,
        });
        self.touch();
    }

    /// Make `step_id` the current step by appending a pending record
    pub fn advance_to(
        &mut self,
        step_id: StepId,
        step_name: String,
        assigned_to: Option<String>,
    ) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Terminal(self.instance_id.0.clone()));
        }

        let now = Utc::now();
        self.steps.push(StepRecord {
            step_id: step_id.clone(),
            step_name,
            status: StepRecordStatus::Pending,
            assigned_to_email: assigned_to,
            executed_by_email: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        });
        self.current_step_id = Some(step_id);
        self.touch();
        Ok(())
    }

    /// Mark the current pending step as completed by `executed_by`
    pub fn complete_current(&mut self, executed_by: &str) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Terminal(self.instance_id.0.clone()));
        }

        let current = self
            .current_step_id
            .clone()
            .ok_or_else(|| CoreError::Store("instance has no current step".to_string()))?;

        let record = self
            .steps
            .iter_mut()
            .find(|r| r.step_id == current && r.status == StepRecordStatus::Pending)
            .ok_or_else(|| {
                CoreError::Store(format!("no pending record for current step {}", current.0))
            })?;

        record.status = StepRecordStatus::Completed;
        record.executed_by_email = Some(executed_by.to_string());
        record.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Move the instance out of its initial state after the first submission
    pub fn mark_in_progress(&mut self) {
        if self.status == InstanceStatus::Started {
            self.status = InstanceStatus::InProgress;
        }
    }

    /// Complete the instance: terminal, no current step
    pub fn finish(&mut self) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Terminal(self.instance_id.0.clone()));
        }

        self.status = InstanceStatus::Completed;
        self.current_step_id = None;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Cancel the instance; the pending step, if any, is marked skipped
    pub fn cancel(&mut self, actor: &str) -> Result<(), CoreError> {
        if self.is_terminal() {
            return Err(CoreError::Terminal(self.instance_id.0.clone()));
        }

        let now = Utc::now();
        if let Some(record) = self
            .steps
            .iter_mut()
            .find(|r| r.status == StepRecordStatus::Pending)
        {
            record.status = StepRecordStatus::Skipped;
            record.executed_by_email = Some(actor.to_string());
            record.completed_at = Some(now);
        }

        self.status = InstanceStatus::Cancelled;
        self.current_step_id = None;
        self.completed_at = Some(now);
        self.touch();
        Ok(())
    }

    /// Merge submitted step data over the accumulated instance data
    pub fn merge_data(&mut self, step_data: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in step_data {
            self.data.insert(key, value);
        }
        self.touch();
    }

    /// Bump the optimistic concurrency counter, returning the prior value
    pub fn bump_version(&mut self) -> u64 {
        let prior = self.version;
        self.version += 1;
        prior
    }

    /// Update the `updated_at` timestamp
    #[inline]
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

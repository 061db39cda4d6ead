use crate::{
    domain::access::StepAccessGuard,
    domain::form,
    domain::repository::{DefinitionRepository, InstanceFilter, InstancePage, InstanceRepository},
    domain::template::resolve_template,
    domain::workflow_definition::{StepDefinition, WorkflowDefinition},
    domain::workflow_instance::{InstanceId, InstanceStatus, StepId, WorkflowId, WorkflowInstance},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// A step definition joined with the instance snapshot it belongs to,
/// returned by the access-checked read path
#[derive(Debug, Clone)]
pub struct StepAccess {
    /// Current instance snapshot
    pub instance: WorkflowInstance,

    /// The current step, with form prefill templates resolved
    pub step: StepDefinition,
}

/// One entry of a user's pending queue
#[derive(Debug, Clone, Serialize)]
pub struct PendingStep {
    /// Instance waiting on the user
    pub instance_id: InstanceId,

    /// Definition the instance executes
    pub workflow_id: WorkflowId,

    /// Denormalized workflow name
    pub workflow_name: String,

    /// The step assigned to the user
    pub step_id: StepId,

    /// Denormalized step name
    pub step_name: String,

    /// Who started the instance
    pub initiated_by_email: String,

    /// Instance status
    pub status: InstanceStatus,

    /// When the instance was created
    pub created_at: DateTime<Utc>,

    /// When the pending step was created
    pub step_created_at: DateTime<Utc>,
}

/// The workflow state machine core
///
/// Stateless per call: every operation loads current state from the
/// injected repositories, validates, conditionally mutates a local copy,
/// and persists it in a single write. There are no retries and no partial
/// applies: when persistence fails the instance keeps its prior state.
pub struct WorkflowRunner {
    /// Repository for workflow definitions
    definitions: Arc<dyn DefinitionRepository>,

    /// Repository for workflow instances
    instances: Arc<dyn InstanceRepository>,
}

impl WorkflowRunner {
    /// Create a new runner over the given repositories
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        instances: Arc<dyn InstanceRepository>,
    ) -> Self {
        Self {
            definitions,
            instances,
        }
    }

    /// Start a new instance of a workflow definition
    ///
    /// The instance never rests on the synthetic start node: it advances
    /// immediately to the start step's successor, with the start step
    /// recorded as completed. Deliberately not idempotent: each call
    /// creates a fresh instance, so a user can run the same workflow
    /// multiple times concurrently.
    pub async fn start(
        &self,
        workflow_id: &WorkflowId,
        user_email: &str,
        user_id: &str,
    ) -> Result<WorkflowInstance, CoreError> {
        let definition = self.load_definition(workflow_id).await?;
        definition.validate()?;

        let start_step = definition.start_step()?;
        let first_id = definition.static_successor(start_step)?;
        let first_step = definition
            .step(&first_id)
            .ok_or_else(|| CoreError::NoTransitionFound(start_step.id().0.clone()))?;

        let mut instance = WorkflowInstance::new(
            workflow_id.clone(),
            definition.name.clone(),
            user_email.to_string(),
            user_id.to_string(),
        );
        instance.record_completed(
            start_step.id().clone(),
            start_step.name().to_string(),
            user_email,
        );

        if first_step.is_end() {
            // Degenerate start -> end definition: nothing for anyone to do
            instance.finish()?;
        } else {
            let assigned = first_step
                .assigned_to()
                .map(|expr| resolve_template(expr, &instance));
            instance.advance_to(first_id.clone(), first_step.name().to_string(), assigned)?;
        }

        self.instances.create(&instance).await?;

        info!(
            instance_id = %instance.instance_id.0,
            workflow_id = %workflow_id.0,
            current_step = ?instance.current_step_id,
            "started workflow instance"
        );
        Ok(instance)
    }

    /// Fetch an instance snapshot
    pub async fn get_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<WorkflowInstance, CoreError> {
        self.load_instance(instance_id).await
    }

    /// List instances with filtering and pagination
    pub async fn list_instances(&self, filter: &InstanceFilter) -> Result<InstancePage, CoreError> {
        self.instances.list(filter).await
    }

    /// Access-checked read of an instance's current step
    ///
    /// Rejects terminal instances, stale or future step ids, and callers
    /// the access rule denies. On success returns the step definition
    /// (form prefill templates resolved) joined with the instance.
    pub async fn validate_step_access(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
        user_email: &str,
    ) -> Result<StepAccess, CoreError> {
        let (instance, _, step) = self.step_context(instance_id, step_id, user_email).await?;
        let step = resolve_prefills(&step, &instance);
        Ok(StepAccess { instance, step })
    }

    /// Submit data for the instance's current step and advance the machine
    ///
    /// Validation happens before any mutation: invalid data leaves the
    /// instance untouched. The transition target is resolved in strict
    /// precedence (condition logic, explicit `next_step`, then the unique
    /// static transition), and an end-typed target completes the instance.
    pub async fn submit_step(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
        user_email: &str,
        step_data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<WorkflowInstance, CoreError> {
        let (mut instance, definition, step) =
            self.step_context(instance_id, step_id, user_email).await?;

        if let Some(form) = step.form() {
            form::validate_submission(&form.fields, &step_data)?;
        }

        let next_id = resolve_transition(&definition, &step, &instance, &step_data)?;
        let next_step = definition
            .step(&next_id)
            .ok_or_else(|| CoreError::NoTransitionFound(step_id.0.clone()))?;

        // Step re-entry is unsupported: a condition arm looping back to an
        // already-completed step is treated as a malformed graph
        if instance.has_completed(&next_id) {
            return Err(CoreError::NoTransitionFound(step_id.0.clone()));
        }

        instance.complete_current(user_email)?;
        instance.merge_data(step_data);

        if next_step.is_end() {
            instance.finish()?;
            info!(
                instance_id = %instance.instance_id.0,
                "workflow instance completed"
            );
        } else {
            let assigned = next_step
                .assigned_to()
                .map(|expr| resolve_template(expr, &instance));
            instance.advance_to(next_id.clone(), next_step.name().to_string(), assigned)?;
            instance.mark_in_progress();
            debug!(
                instance_id = %instance.instance_id.0,
                from = %step_id.0,
                to = %next_id.0,
                "advanced workflow instance"
            );
        }

        let expected = instance.bump_version();
        self.instances.update(&instance, expected).await?;
        Ok(instance)
    }

    /// Cancel a non-terminal instance
    ///
    /// The pending step, if any, is marked skipped with the actor recorded.
    pub async fn cancel(
        &self,
        instance_id: &InstanceId,
        actor_email: &str,
    ) -> Result<WorkflowInstance, CoreError> {
        let mut instance = self.load_instance(instance_id).await?;
        instance.cancel(actor_email)?;

        let expected = instance.bump_version();
        self.instances.update(&instance, expected).await?;

        info!(
            instance_id = %instance.instance_id.0,
            actor = %actor_email,
            "cancelled workflow instance"
        );
        Ok(instance)
    }

    /// The user's pending queue: instances whose current step awaits them
    ///
    /// Read-only convenience query backing the polling notification client.
    pub async fn pending_for(&self, user_email: &str) -> Result<Vec<PendingStep>, CoreError> {
        let instances = self.instances.find_pending_for(user_email).await?;

        let pending = instances
            .iter()
            .filter_map(|instance| {
                let record = instance.pending_record()?;
                Some(PendingStep {
                    instance_id: instance.instance_id.clone(),
                    workflow_id: instance.workflow_id.clone(),
                    workflow_name: instance.workflow_name.clone(),
                    step_id: record.step_id.clone(),
                    step_name: record.step_name.clone(),
                    initiated_by_email: instance.initiated_by_email.clone(),
                    status: instance.status,
                    created_at: instance.created_at,
                    step_created_at: record.created_at,
                })
            })
            .collect();

        Ok(pending)
    }

    /// Shared gate for the read and write paths: load, reject terminal
    /// instances and step mismatches, then apply the access rule
    async fn step_context(
        &self,
        instance_id: &InstanceId,
        step_id: &StepId,
        user_email: &str,
    ) -> Result<(WorkflowInstance, WorkflowDefinition, StepDefinition), CoreError> {
        let instance = self.load_instance(instance_id).await?;

        if instance.is_terminal() {
            return Err(CoreError::Terminal(instance.instance_id.0.clone()));
        }

        match &instance.current_step_id {
            Some(current) if current == step_id => {}
            other => {
                return Err(CoreError::StepMismatch {
                    requested: step_id.0.clone(),
                    current: other.as_ref().map(|id| id.0.clone()),
                })
            }
        }

        let definition = self.load_definition(&instance.workflow_id).await?;
        let step = definition
            .step(step_id)
            .ok_or_else(|| CoreError::StepNotFound(step_id.0.clone()))?
            .clone();

        if !StepAccessGuard::can_act(&instance, &step, user_email) {
            debug!(
                instance_id = %instance.instance_id.0,
                step_id = %step_id.0,
                user = %user_email,
                "step access denied"
            );
            return Err(CoreError::AccessDenied);
        }

        Ok((instance, definition, step))
    }

    async fn load_instance(&self, instance_id: &InstanceId) -> Result<WorkflowInstance, CoreError> {
        self.instances
            .find_by_id(instance_id)
            .await?
            .ok_or_else(|| CoreError::InstanceNotFound(instance_id.0.clone()))
    }

    async fn load_definition(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<WorkflowDefinition, CoreError> {
        self.definitions
            .find_by_id(workflow_id)
            .await?
            .ok_or_else(|| CoreError::DefinitionNotFound(workflow_id.0.clone()))
    }
}

/// Resolve the step the machine advances to next
///
/// Exhaustive over the step variants: condition steps branch on their
/// variable's value in the merged data (current submission over prior
/// accumulated data); every other variant uses `next_step` or the unique
/// static transition.
fn resolve_transition(
    definition: &WorkflowDefinition,
    step: &StepDefinition,
    instance: &WorkflowInstance,
    step_data: &serde_json::Map<String, serde_json::Value>,
) -> Result<StepId, CoreError> {
    match step {
        StepDefinition::Condition(condition) => {
            let logic = &condition.logic;
            let value = step_data
                .get(&logic.variable)
                .or_else(|| instance.data.get(&logic.variable))
                .map(form::value_text)
                .unwrap_or_default();

            let target = logic
                .cases
                .iter()
                .find(|arm| arm.value == value)
                .map(|arm| arm.target_step_id.clone())
                .unwrap_or_else(|| logic.default.clone());

            debug!(
                step_id = %condition.meta.id.0,
                variable = %logic.variable,
                value = %value,
                target = %target.0,
                "evaluated condition step"
            );
            Ok(target)
        }
        StepDefinition::Start(_)
        | StepDefinition::Form(_)
        | StepDefinition::Action(_)
        | StepDefinition::End(_) => definition.static_successor(step),
    }
}

/// Clone a step with its form prefill templates resolved for display
fn resolve_prefills(step: &StepDefinition, instance: &WorkflowInstance) -> StepDefinition {
    let mut step = step.clone();
    if let StepDefinition::Form(form_step) = &mut step {
        for field in &mut form_step.form.fields {
            if let Some(value) = &field.value {
                field.value = Some(resolve_template(value, instance));
            }
        }
    }
    step
}

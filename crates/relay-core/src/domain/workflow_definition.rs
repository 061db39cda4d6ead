use crate::domain::form::{Field, FieldType, Form};
use crate::domain::workflow_instance::{StepId, WorkflowId};
use crate::CoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Represents a parsed and validated workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// ID of the workflow
    pub id: WorkflowId,

    /// Human-readable name of the workflow
    pub name: String,

    /// Description of the workflow
    #[serde(default)]
    pub description: String,

    /// The workflow version
    pub version: String,

    /// The steps in this workflow
    pub steps: Vec<StepDefinition>,

    /// Static edges, used when a step has no explicit next-step logic
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// A static edge between two steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Source step id
    pub from: StepId,

    /// Target step id
    pub to: StepId,
}

/// Fields shared by every step variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMeta {
    /// ID of the step, unique within its definition
    pub id: StepId,

    /// Human-readable name of the step
    pub name: String,

    /// Explicit successor, taking precedence over static transitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepId>,

    /// Principal allowed to act on the step; may contain
    /// `{{step.field}}` templates resolved against the instance
    #[serde(rename = "assignedTo", default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

/// A form step's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormStep {
    /// Shared step fields
    #[serde(flatten)]
    pub meta: StepMeta,

    /// The form a user must submit before the step advances
    pub form: Form,
}

/// An action step's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    /// Shared step fields
    #[serde(flatten)]
    pub meta: StepMeta,

    /// Opaque action config (`{"type": ..., ...}`) executed by an
    /// external collaborator; the engine records and advances past it
    pub action: serde_json::Value,
}

/// A condition step's payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionStep {
    /// Shared step fields
    #[serde(flatten)]
    pub meta: StepMeta,

    /// The branch table evaluated against accumulated instance data
    pub logic: ConditionLogic,
}

/// Branch table of a condition step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionLogic {
    /// Name of the accumulated-data variable to switch on
    pub variable: String,

    /// Match arms, evaluated in order with string equality
    pub cases: Vec<CaseArm>,

    /// Target when no case matches
    pub default: StepId,
}

/// One arm of a condition step's branch table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    /// Value the variable must equal
    pub value: String,

    /// Step to advance to when this arm matches
    #[serde(rename = "targetStepId")]
    pub target_step_id: StepId,
}

/// A step in a workflow definition
///
/// Closed sum over the supported step types; the runner matches on this
/// exhaustively, so adding a step type is a compile-time-checked change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepDefinition {
    /// Synthetic entry node; instances never rest on it
    Start(StepMeta),

    /// Step requiring user-submitted form data before advancing
    Form(FormStep),

    /// Step whose action an external collaborator executes
    Action(ActionStep),

    /// Step that branches on a named accumulated-data variable
    Condition(ConditionStep),

    /// Terminal node; advancing into it completes the instance
    End(StepMeta),
}

impl StepDefinition {
    /// Shared fields of any variant
    pub fn meta(&self) -> &StepMeta {
        match self {
            StepDefinition::Start(meta) | StepDefinition::End(meta) => meta,
            StepDefinition::Form(step) => &step.meta,
            StepDefinition::Action(step) => &step.meta,
            StepDefinition::Condition(step) => &step.meta,
        }
    }

    /// The step's id
    #[inline]
    pub fn id(&self) -> &StepId {
        &self.meta().id
    }

    /// The step's display name
    #[inline]
    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// Explicit successor, if declared
    #[inline]
    pub fn next_step(&self) -> Option<&StepId> {
        self.meta().next_step.as_ref()
    }

    /// Assignee expression, if declared
    #[inline]
    pub fn assigned_to(&self) -> Option<&str> {
        self.meta().assigned_to.as_deref()
    }

    /// The attached form, for form steps
    pub fn form(&self) -> Option<&Form> {
        match self {
            StepDefinition::Form(step) => Some(&step.form),
            _ => None,
        }
    }

    /// Whether this is a terminal step
    #[inline]
    pub fn is_end(&self) -> bool {
        matches!(self, StepDefinition::End(_))
    }

    /// Wire name of the step type (`start`, `form`, ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            StepDefinition::Start(_) => "start",
            StepDefinition::Form(_) => "form",
            StepDefinition::Action(_) => "action",
            StepDefinition::Condition(_) => "condition",
            StepDefinition::End(_) => "end",
        }
    }

    /// Step ids this step can advance to, in evaluation order
    fn successor_ids(&self) -> Vec<&StepId> {
        let mut targets = Vec::new();
        if let StepDefinition::Condition(step) = self {
            for arm in &step.logic.cases {
                targets.push(&arm.target_step_id);
            }
            targets.push(&step.logic.default);
        }
        if let Some(next) = self.next_step() {
            targets.push(next);
        }
        targets
    }
}

impl WorkflowDefinition {
    /// Look up a step by id
    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// The unique start step
    pub fn start_step(&self) -> Result<&StepDefinition, CoreError> {
        let mut starts = self
            .steps
            .iter()
            .filter(|s| matches!(s, StepDefinition::Start(_)));
        match (starts.next(), starts.next()) {
            (Some(step), None) => Ok(step),
            _ => Err(CoreError::DefinitionInvalid(format!(
                "workflow {} must have exactly one start step",
                self.id.0
            ))),
        }
    }

    /// The unique static transition out of `from`
    ///
    /// Zero or more than one matching edge is a definition error, not a
    /// runtime retry condition.
    pub fn transition_target(&self, from: &StepId) -> Result<StepId, CoreError> {
        let mut matching = self.transitions.iter().filter(|t| &t.from == from);
        match (matching.next(), matching.next()) {
            (Some(transition), None) => Ok(transition.to.clone()),
            _ => Err(CoreError::NoTransitionFound(from.0.clone())),
        }
    }

    /// Resolve a step's successor without condition logic: explicit
    /// `next_step` first, then the unique static transition
    pub fn static_successor(&self, step: &StepDefinition) -> Result<StepId, CoreError> {
        if let Some(next) = step.next_step() {
            return Ok(next.clone());
        }
        self.transition_target(step.id())
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.steps.is_empty() {
            return Err(CoreError::DefinitionInvalid(format!(
                "workflow {} has no steps",
                self.id.0
            )));
        }

        // Step id uniqueness
        let mut step_ids: HashSet<&StepId> = HashSet::new();
        for step in &self.steps {
            if !step_ids.insert(step.id()) {
                return Err(CoreError::DefinitionInvalid(format!(
                    "duplicate step id: {}",
                    step.id().0
                )));
            }
        }

        // Exactly one start, at least one end
        let start = self.start_step()?;
        if !self.steps.iter().any(|s| s.is_end()) {
            return Err(CoreError::DefinitionInvalid(format!(
                "workflow {} has no end step",
                self.id.0
            )));
        }

        // Every referenced step id must exist
        for step in &self.steps {
            for target in step.successor_ids() {
                if !step_ids.contains(target) {
                    return Err(CoreError::DefinitionInvalid(format!(
                        "step {} references unknown step: {}",
                        step.id().0,
                        target.0
                    )));
                }
            }
        }
        for transition in &self.transitions {
            for endpoint in [&transition.from, &transition.to] {
                if !step_ids.contains(endpoint) {
                    return Err(CoreError::DefinitionInvalid(format!(
                        "transition references unknown step: {}",
                        endpoint.0
                    )));
                }
            }
        }

        self.validate_fields()?;

        // Every non-end step must be reachable from start
        let reachable = self.reachable_from(start.id());
        for step in &self.steps {
            if !step.is_end() && !reachable.contains(step.id()) {
                return Err(CoreError::DefinitionInvalid(format!(
                    "step {} is not reachable from the start step",
                    step.id().0
                )));
            }
        }

        Ok(())
    }

    /// Field-level definition checks: select options and regex patterns
    fn validate_fields(&self) -> Result<(), CoreError> {
        for step in &self.steps {
            let Some(form) = step.form() else { continue };
            for field in &form.fields {
                self.validate_field(step, field)?;
            }
        }
        Ok(())
    }

    fn validate_field(&self, step: &StepDefinition, field: &Field) -> Result<(), CoreError> {
        if field.field_type == FieldType::Select && field.options.is_empty() {
            return Err(CoreError::DefinitionInvalid(format!(
                "select field {} in step {} has no options",
                field.id,
                step.id().0
            )));
        }
        if let Some(pattern) = field.validation.as_ref().and_then(|r| r.pattern.as_deref()) {
            if Regex::new(&format!("^(?:{})$", pattern)).is_err() {
                return Err(CoreError::DefinitionInvalid(format!(
                    "field {} in step {} has an invalid pattern: {}",
                    field.id,
                    step.id().0,
                    pattern
                )));
            }
        }
        Ok(())
    }

    /// BFS over next_step, condition targets, and static transitions
    fn reachable_from(&self, start: &StepId) -> HashSet<StepId> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            let mut targets: Vec<StepId> = Vec::new();
            if let Some(step) = self.step(&current) {
                targets.extend(step.successor_ids().into_iter().cloned());
            }
            targets.extend(
                self.transitions
                    .iter()
                    .filter(|t| t.from == current)
                    .map(|t| t.to.clone()),
            );

            for target in targets {
                if reachable.insert(target.clone()) {
                    queue.push_back(target);
                }
            }
        }

        reachable
    }
}

use std::collections::BTreeMap;
use thiserror::Error;

/// Per-field validation messages, keyed by field id.
///
/// A `BTreeMap` keeps the serialized form deterministic so error payloads
/// are stable across runs.
pub type FieldErrors = BTreeMap<String, String>;

/// Core error type for the Relay workflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow definition not found
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// Workflow definition failed structural validation
    #[error("Invalid workflow definition: {0}")]
    DefinitionInvalid(String),

    /// Workflow instance not found
    #[error("Workflow instance not found: {0}")]
    InstanceNotFound(String),

    /// Step id does not exist in the definition
    #[error("Step not found: {0}")]
    StepNotFound(String),

    /// Requested step is not the instance's current step
    #[error("Step {requested} is not the current step (current: {current:?})")]
    StepMismatch {
        /// The step id the caller asked for
        requested: String,
        /// The instance's actual current step, if any
        current: Option<String>,
    },

    /// Caller is not authorized to act on the step
    #[error("Not authorized to act on this step")]
    AccessDenied,

    /// Submitted step data violated one or more field constraints
    #[error("Step data failed validation for {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// The definition graph has no unambiguous transition out of a step
    #[error("No transition found from step: {0}")]
    NoTransitionFound(String),

    /// Instance is completed or cancelled; terminal states are absorbing
    #[error("Workflow instance is in a terminal state: {0}")]
    Terminal(String),

    /// Instance was modified concurrently; the caller's snapshot is stale
    #[error("Workflow instance was modified concurrently: {0}")]
    Conflict(String),

    /// State store error
    #[error("State store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Store(format!("serialization error: {}", err))
    }
}

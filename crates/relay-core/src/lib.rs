//!
//! Relay Core - the workflow engine for Relay
//!
//! This crate defines the domain models, repository interfaces, and the
//! workflow runner (state machine). It owns no storage and no transport:
//! persistence sits behind repository traits and the HTTP surface lives
//! in `relay-server`, so the state machine is independently testable
//! against in-memory fakes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - core business models, entities, and rules
pub mod domain;

/// Application services - the workflow runner
pub mod application;

/// Error types
pub mod error;

// Re-export key types
pub use error::{CoreError, FieldErrors};

pub use application::workflow_runner::{PendingStep, StepAccess, WorkflowRunner};

// Re-export main API types for easy use
pub use domain::form::{Field, FieldRules, FieldType, Form, SubmitAction};
pub use domain::repository::{
    DefinitionRepository, InstanceFilter, InstancePage, InstanceRepository,
};
pub use domain::workflow_definition::{
    ActionStep, CaseArm, ConditionLogic, ConditionStep, FormStep, StepDefinition, StepMeta,
    Transition, WorkflowDefinition,
};
pub use domain::workflow_instance::{
    InstanceId, InstanceStatus, StepId, StepRecord, StepRecordStatus, WorkflowId, WorkflowInstance,
};

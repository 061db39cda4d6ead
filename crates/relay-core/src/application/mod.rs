//! Application services: the workflow runner

/// The workflow state machine core
pub mod workflow_runner;

pub use workflow_runner::{PendingStep, StepAccess, WorkflowRunner};

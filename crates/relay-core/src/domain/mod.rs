//! Domain layer: definitions, instances, forms, authorization, and the
//! repository seams the runner depends on

/// Step-level authorization guard
pub mod access;

/// Form and field data contract plus submission validation
pub mod form;

/// Repository traits
pub mod repository;

/// Template variable resolution
pub mod template;

/// Workflow definition model
pub mod workflow_definition;

/// Workflow instance model
pub mod workflow_instance;

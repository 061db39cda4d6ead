//! Step-level authorization
//!
//! Both the read path (`validate_step_access`) and the write path
//! (`submit_step`) gate on the same decision function, re-evaluated
//! against current instance state on every call; assignments can change
//! between steps, so decisions are never cached.

use crate::domain::template::resolve_template;
use crate::domain::workflow_definition::StepDefinition;
use crate::domain::workflow_instance::WorkflowInstance;

/// Gatekeeper for reads and writes against an instance+step pair
pub struct StepAccessGuard;

impl StepAccessGuard {
    /// Whether `user_email` may view or act on `step` of `instance`
    ///
    /// A step with an `assignedTo` expression admits exactly the resolved
    /// assignee (case-insensitive email comparison). Unassigned steps
    /// default to the instance's initiator.
    pub fn can_act(instance: &WorkflowInstance, step: &StepDefinition, user_email: &str) -> bool {
        match step.assigned_to() {
            Some(assigned_to) => {
                let resolved = resolve_template(assigned_to, instance);
                user_email.eq_ignore_ascii_case(&resolved)
            }
            None => user_email.eq_ignore_ascii_case(&instance.initiated_by_email),
        }
    }
}

//! Integration tests for the workflow runner
//!
//! Drives the state machine end-to-end through the repository traits,
//! backed by in-process fakes, so every lifecycle property is checked
//! without a network or a real store.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay_core::{
    CoreError, DefinitionRepository, InstanceFilter, InstanceId, InstancePage, InstanceRepository,
    InstanceStatus, StepId, StepRecordStatus, WorkflowDefinition, WorkflowId, WorkflowInstance,
    WorkflowRunner,
};

#[derive(Default)]
struct FakeDefinitionRepository {
    definitions: Mutex<HashMap<String, WorkflowDefinition>>,
}

#[async_trait]
impl DefinitionRepository for FakeDefinitionRepository {
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, CoreError> {
        Ok(self.definitions.lock().unwrap().get(&id.0).cloned())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), CoreError> {
        self.definitions
            .lock()
            .unwrap()
            .insert(definition.id.0.clone(), definition.clone());
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, CoreError> {
        Ok(self.definitions.lock().unwrap().values().cloned().collect())
    }
}

#[derive(Default)]
struct FakeInstanceRepository {
    instances: Mutex<HashMap<String, WorkflowInstance>>,
    // One-shot stale read, used to simulate a lost race against a
    // concurrent writer
    read_override: Mutex<Option<WorkflowInstance>>,
}

impl FakeInstanceRepository {
    /// Overwrite a stored instance directly, bypassing the CAS, to
    /// simulate a concurrent writer
    fn poke(&self, instance: WorkflowInstance) {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.instance_id.0.clone(), instance);
    }

    /// Serve `instance` on the next read instead of the stored copy
    fn serve_stale_once(&self, instance: WorkflowInstance) {
        *self.read_override.lock().unwrap() = Some(instance);
    }

    fn stored(&self, id: &InstanceId) -> WorkflowInstance {
        self.instances.lock().unwrap().get(&id.0).cloned().unwrap()
    }
}

#[async_trait]
impl InstanceRepository for FakeInstanceRepository {
    async fn find_by_id(&self, id: &InstanceId) -> Result<Option<WorkflowInstance>, CoreError> {
        if let Some(stale) = self.read_override.lock().unwrap().take() {
            if stale.instance_id == *id {
                return Ok(Some(stale));
            }
        }
        Ok(self.instances.lock().unwrap().get(&id.0).cloned())
    }

    async fn create(&self, instance: &WorkflowInstance) -> Result<(), CoreError> {
        self.instances
            .lock()
            .unwrap()
            .insert(instance.instance_id.0.clone(), instance.clone());
        Ok(())
    }

    async fn update(
        &self,
        instance: &WorkflowInstance,
        expected_version: u64,
    ) -> Result<(), CoreError> {
        let mut instances = self.instances.lock().unwrap();
        let stored = instances
            .get(&instance.instance_id.0)
            .ok_or_else(|| CoreError::InstanceNotFound(instance.instance_id.0.clone()))?;
        if stored.version != expected_version {
            return Err(CoreError::Conflict(instance.instance_id.0.clone()));
        }
        instances.insert(instance.instance_id.0.clone(), instance.clone());
        Ok(())
    }

    async fn list(&self, filter: &InstanceFilter) -> Result<InstancePage, CoreError> {
        let instances: Vec<WorkflowInstance> = self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| {
                filter
                    .initiated_by
                    .as_deref()
                    .map_or(true, |email| i.initiated_by_email == email)
            })
            .cloned()
            .collect();
        let total_count = instances.len();
        Ok(InstancePage {
            instances,
            total_count,
        })
    }

    async fn find_pending_for(
        &self,
        user_email: &str,
    ) -> Result<Vec<WorkflowInstance>, CoreError> {
        Ok(self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|i| !i.is_terminal())
            .filter(|i| {
                i.pending_record()
                    .and_then(|r| r.assigned_to_email.as_deref())
                    .map_or(false, |email| email.eq_ignore_ascii_case(user_email))
            })
            .cloned()
            .collect())
    }
}

struct Harness {
    runner: WorkflowRunner,
    instances: Arc<FakeInstanceRepository>,
}

fn harness(definitions: &[&str]) -> Harness {
    let definition_repo = Arc::new(FakeDefinitionRepository::default());
    for json in definitions {
        let definition: WorkflowDefinition = serde_json::from_str(json).unwrap();
        definition.validate().unwrap();
        definition_repo
            .definitions
            .lock()
            .unwrap()
            .insert(definition.id.0.clone(), definition);
    }
    let instances = Arc::new(FakeInstanceRepository::default());
    let runner = WorkflowRunner::new(definition_repo, instances.clone());
    Harness { runner, instances }
}

/// start -> form -> end
const SIMPLE_WF: &str = r#"{
    "id": "wf_simple",
    "name": "Simple",
    "version": "1.0",
    "steps": [
        {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
        {
            "type": "form", "id": "request", "name": "Request", "next_step": "end",
            "form": {
                "id": "request_form", "title": "Request",
                "fields": [
                    {"id": "name", "label": "Name", "type": "text", "required": true}
                ]
            }
        },
        {"type": "end", "id": "end", "name": "Done"}
    ]
}"#;

/// start -> form -> condition branching on "x" -> one of three forms -> end
const BRANCHING_WF: &str = r#"{
    "id": "wf_branching",
    "name": "Branching",
    "version": "1.0",
    "steps": [
        {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
        {
            "type": "form", "id": "request", "name": "Request", "next_step": "route",
            "form": {
                "id": "request_form", "title": "Request",
                "fields": [{"id": "x", "label": "X", "type": "text", "required": true}]
            }
        },
        {
            "type": "condition", "id": "route", "name": "Route",
            "logic": {
                "variable": "x",
                "cases": [
                    {"value": "a", "targetStepId": "s1"},
                    {"value": "b", "targetStepId": "s2"}
                ],
                "default": "s3"
            }
        },
        {"type": "form", "id": "s1", "name": "S1", "next_step": "end",
         "form": {"id": "f1", "title": "S1", "fields": []}},
        {"type": "form", "id": "s2", "name": "S2", "next_step": "end",
         "form": {"id": "f2", "title": "S2", "fields": []}},
        {"type": "form", "id": "s3", "name": "S3", "next_step": "end",
         "form": {"id": "f3", "title": "S3", "fields": []}},
        {"type": "end", "id": "end", "name": "Done"}
    ]
}"#;

/// start -> unassigned form -> manager-assigned form -> action -> end
const APPROVAL_WF: &str = r#"{
    "id": "wf_approval",
    "name": "Approval",
    "version": "1.0",
    "steps": [
        {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
        {
            "type": "form", "id": "request", "name": "Request", "next_step": "approval",
            "form": {
                "id": "request_form", "title": "Request",
                "fields": [
                    {"id": "requester", "label": "Requester", "type": "text",
                     "required": true, "readonly": true, "value": "{{start.user_email}}"},
                    {"id": "reason", "label": "Reason", "type": "textarea", "required": true}
                ]
            }
        },
        {
            "type": "form", "id": "approval", "name": "Approval",
            "assignedTo": "manager@example.com", "next_step": "notify",
            "form": {
                "id": "approval_form", "title": "Approve",
                "fields": [
                    {"id": "decision", "label": "Decision", "type": "select",
                     "required": true, "options": ["approve", "reject"]}
                ]
            }
        },
        {"type": "action", "id": "notify", "name": "Notify", "next_step": "end",
         "action": {"type": "email", "template": "decision_made"}},
        {"type": "end", "id": "end", "name": "Done"}
    ]
}"#;

fn step_data(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

const ALICE: &str = "alice@example.com";
const MANAGER: &str = "manager@example.com";

fn assert_single_pending(instance: &WorkflowInstance) {
    let pending: Vec<_> = instance
        .steps
        .iter()
        .filter(|r| r.status == StepRecordStatus::Pending)
        .collect();
    assert_eq!(pending.len(), 1, "exactly one pending step expected");
    assert_eq!(
        Some(&pending[0].step_id),
        instance.current_step_id.as_ref(),
        "pending step must match current_step_id"
    );
}

// After start the instance rests on the first real step
#[tokio::test]
async fn start_rests_on_first_real_step() {
    let h = harness(&[SIMPLE_WF]);

    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Started);
    assert_eq!(instance.current_step_id, Some(StepId("request".to_string())));
    assert_eq!(instance.workflow_name, "Simple");
    assert_eq!(instance.initiated_by_email, ALICE);

    assert_eq!(instance.steps.len(), 2);
    assert_eq!(instance.steps[0].step_id, StepId("start".to_string()));
    assert_eq!(instance.steps[0].status, StepRecordStatus::Completed);
    assert_eq!(instance.steps[1].step_id, StepId("request".to_string()));
    assert_eq!(instance.steps[1].status, StepRecordStatus::Pending);
    assert_single_pending(&instance);
}

#[tokio::test]
async fn start_unknown_workflow_fails() {
    let h = harness(&[SIMPLE_WF]);

    let result = h
        .runner
        .start(&WorkflowId("wf_ghost".to_string()), ALICE, "user_1")
        .await;

    assert!(matches!(result, Err(CoreError::DefinitionNotFound(id)) if id == "wf_ghost"));
}

// Starting twice creates two independent instances, by design
#[tokio::test]
async fn start_is_not_idempotent() {
    let h = harness(&[SIMPLE_WF]);
    let workflow_id = WorkflowId("wf_simple".to_string());

    let first = h.runner.start(&workflow_id, ALICE, "user_1").await.unwrap();
    let second = h.runner.start(&workflow_id, ALICE, "user_1").await.unwrap();

    assert_ne!(first.instance_id, second.instance_id);
}

// A valid submission whose successor is an end step completes the instance
#[tokio::test]
async fn submit_into_end_completes_instance() {
    let h = harness(&[SIMPLE_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let updated = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("name", json!("Alice"))]),
        )
        .await
        .unwrap();

    assert_eq!(updated.status, InstanceStatus::Completed);
    assert_eq!(updated.current_step_id, None);
    assert!(updated.completed_at.is_some());
    assert_eq!(updated.data.get("name"), Some(&json!("Alice")));

    let request_record = updated
        .steps
        .iter()
        .find(|r| r.step_id == StepId("request".to_string()))
        .unwrap();
    assert_eq!(request_record.status, StepRecordStatus::Completed);
    assert_eq!(request_record.executed_by_email.as_deref(), Some(ALICE));
    assert!(updated.pending_record().is_none());
}

// Invalid data is rejected before any state mutation
#[tokio::test]
async fn invalid_submission_leaves_instance_unchanged() {
    let h = harness(&[SIMPLE_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();
    let before = h.instances.stored(&instance.instance_id);

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await;

    match result {
        Err(CoreError::Validation(errors)) => {
            assert!(errors.contains_key("name"));
        }
        other => panic!("Expected Validation error, got {:?}", other),
    }

    let after = h.instances.stored(&instance.instance_id);
    assert_eq!(after, before);
}

// Exactly one pending step, matching current_step_id, at every point of a run
#[tokio::test]
async fn single_pending_invariant_holds_across_steps() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();
    assert_single_pending(&instance);

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("reason", json!("conference"))]),
        )
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::InProgress);
    assert_single_pending(&instance);

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("approval".to_string()),
            MANAGER,
            step_data(&[("decision", json!("approve"))]),
        )
        .await
        .unwrap();
    assert_single_pending(&instance);
    assert_eq!(instance.current_step_id, Some(StepId("notify".to_string())));

    // The action step advances on an empty submission; the engine does not
    // interpret the action payload
    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("notify".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::Completed);
    assert!(instance.pending_record().is_none());
}

// Terminal states are absorbing
#[tokio::test]
async fn completed_instance_rejects_further_submissions() {
    let h = harness(&[SIMPLE_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();
    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("name", json!("Alice"))]),
        )
        .await
        .unwrap();
    let before = h.instances.stored(&instance.instance_id);

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("name", json!("Again"))]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::Terminal(_))));

    let result = h.runner.cancel(&instance.instance_id, ALICE).await;
    assert!(matches!(result, Err(CoreError::Terminal(_))));

    assert_eq!(h.instances.stored(&instance.instance_id), before);
}

// A matching condition case routes to its target
#[tokio::test]
async fn condition_routes_matching_case() {
    let h = harness(&[BRANCHING_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_branching".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("x", json!("b"))]),
        )
        .await
        .unwrap();
    assert_eq!(instance.current_step_id, Some(StepId("route".to_string())));

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("route".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await
        .unwrap();
    assert_eq!(instance.current_step_id, Some(StepId("s2".to_string())));
}

// No matching case falls back to the default target
#[tokio::test]
async fn condition_falls_back_to_default() {
    let h = harness(&[BRANCHING_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_branching".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("x", json!("z"))]),
        )
        .await
        .unwrap();

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("route".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await
        .unwrap();
    assert_eq!(instance.current_step_id, Some(StepId("s3".to_string())));
}

// Current-submission data shadows previously accumulated data
#[tokio::test]
async fn condition_reads_freshly_submitted_data_first() {
    let h = harness(&[BRANCHING_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_branching".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("x", json!("b"))]),
        )
        .await
        .unwrap();

    // Submitting the condition step with a new value for x overrides the
    // accumulated "b"
    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("route".to_string()),
            ALICE,
            step_data(&[("x", json!("a"))]),
        )
        .await
        .unwrap();
    assert_eq!(instance.current_step_id, Some(StepId("s1".to_string())));
}

// The access gate admits the assignee and only the assignee
#[tokio::test]
async fn assigned_step_denies_other_users() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();
    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("reason", json!("conference"))]),
        )
        .await
        .unwrap();

    let approval = StepId("approval".to_string());

    let result = h
        .runner
        .validate_step_access(&instance.instance_id, &approval, "bob@example.com")
        .await;
    assert!(matches!(result, Err(CoreError::AccessDenied)));

    // The write path uses the identical gate
    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &approval,
            "bob@example.com",
            step_data(&[("decision", json!("approve"))]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::AccessDenied)));

    let access = h
        .runner
        .validate_step_access(&instance.instance_id, &approval, MANAGER)
        .await
        .unwrap();
    assert_eq!(access.step.id(), &approval);
    assert_eq!(access.instance.instance_id, instance.instance_id);
}

#[tokio::test]
async fn unassigned_step_admits_only_initiator() {
    let h = harness(&[SIMPLE_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let result = h
        .runner
        .validate_step_access(
            &instance.instance_id,
            &StepId("request".to_string()),
            "bob@example.com",
        )
        .await;
    assert!(matches!(result, Err(CoreError::AccessDenied)));

    assert!(h
        .runner
        .validate_step_access(&instance.instance_id, &StepId("request".to_string()), ALICE)
        .await
        .is_ok());
}

// Stale and future step ids are rejected, not merely warned about
#[tokio::test]
async fn stale_step_id_is_rejected() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let result = h
        .runner
        .validate_step_access(&instance.instance_id, &StepId("approval".to_string()), ALICE)
        .await;
    match result {
        Err(CoreError::StepMismatch { requested, current }) => {
            assert_eq!(requested, "approval");
            assert_eq!(current.as_deref(), Some("request"));
        }
        other => panic!("Expected StepMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_instance_is_rejected() {
    let h = harness(&[SIMPLE_WF]);

    let result = h
        .runner
        .validate_step_access(
            &InstanceId("ghost".to_string()),
            &StepId("request".to_string()),
            ALICE,
        )
        .await;
    assert!(matches!(result, Err(CoreError::InstanceNotFound(_))));
}

// Readonly prefills resolve templates against the instance at read time
#[tokio::test]
async fn form_prefill_templates_resolve() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let access = h
        .runner
        .validate_step_access(&instance.instance_id, &StepId("request".to_string()), ALICE)
        .await
        .unwrap();

    let form = access.step.form().unwrap();
    let requester = form.fields.iter().find(|f| f.id == "requester").unwrap();
    assert_eq!(requester.value.as_deref(), Some(ALICE));
}

// A concurrent writer invalidates the caller's snapshot
#[tokio::test]
async fn concurrent_update_surfaces_conflict() {
    let h = harness(&[SIMPLE_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_simple".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    // A concurrent writer commits first: the store now holds a newer
    // version while our caller still reads the original snapshot
    let stale = h.instances.stored(&instance.instance_id);
    let mut winner = stale.clone();
    winner.bump_version();
    h.instances.poke(winner);
    h.instances.serve_stale_once(stale);

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("name", json!("Alice"))]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::Conflict(_))));
}

#[tokio::test]
async fn cancel_skips_pending_and_terminates() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let cancelled = h
        .runner
        .cancel(&instance.instance_id, "admin@example.com")
        .await
        .unwrap();

    assert_eq!(cancelled.status, InstanceStatus::Cancelled);
    assert_eq!(cancelled.current_step_id, None);
    assert!(cancelled.completed_at.is_some());

    let request_record = cancelled
        .steps
        .iter()
        .find(|r| r.step_id == StepId("request".to_string()))
        .unwrap();
    assert_eq!(request_record.status, StepRecordStatus::Skipped);
    assert_eq!(
        request_record.executed_by_email.as_deref(),
        Some("admin@example.com")
    );

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("reason", json!("late"))]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::Terminal(_))));
}

#[tokio::test]
async fn pending_queue_tracks_current_assignee() {
    let h = harness(&[APPROVAL_WF]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_approval".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    // The unassigned request step puts nothing in anyone's queue
    assert!(h.runner.pending_for(MANAGER).await.unwrap().is_empty());

    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("reason", json!("conference"))]),
        )
        .await
        .unwrap();

    let pending = h.runner.pending_for(MANAGER).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].instance_id, instance.instance_id);
    assert_eq!(pending[0].step_id, StepId("approval".to_string()));
    assert_eq!(pending[0].step_name, "Approval");
    assert_eq!(pending[0].workflow_name, "Approval");
    assert_eq!(pending[0].initiated_by_email, ALICE);

    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("approval".to_string()),
            MANAGER,
            step_data(&[("decision", json!("approve"))]),
        )
        .await
        .unwrap();

    assert!(h.runner.pending_for(MANAGER).await.unwrap().is_empty());
}

// A form step with no outgoing edge is a definition error at submit time
#[tokio::test]
async fn missing_transition_is_a_definition_error() {
    let dead_end = r#"{
        "id": "wf_dead_end",
        "name": "Dead End",
        "version": "1.0",
        "steps": [
            {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
            {"type": "form", "id": "request", "name": "Request",
             "form": {"id": "f", "title": "Request", "fields": []}},
            {"type": "end", "id": "end", "name": "Done"}
        ]
    }"#;
    let h = harness(&[dead_end]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_dead_end".to_string()), ALICE, "user_1")
        .await
        .unwrap();
    let before = h.instances.stored(&instance.instance_id);

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::NoTransitionFound(_))));
    assert_eq!(h.instances.stored(&instance.instance_id), before);
}

// Condition arms looping back to a completed step are rejected: the
// history model does not support step re-entry
#[tokio::test]
async fn condition_loop_to_completed_step_is_rejected() {
    let looping = r#"{
        "id": "wf_loop",
        "name": "Loop",
        "version": "1.0",
        "steps": [
            {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
            {"type": "form", "id": "request", "name": "Request", "next_step": "route",
             "form": {"id": "f", "title": "Request",
                      "fields": [{"id": "x", "label": "X", "type": "text", "required": true}]}},
            {"type": "condition", "id": "route", "name": "Route",
             "logic": {"variable": "x",
                       "cases": [{"value": "back", "targetStepId": "request"}],
                       "default": "end"}},
            {"type": "end", "id": "end", "name": "Done"}
        ]
    }"#;
    let h = harness(&[looping]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_loop".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    h.runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("x", json!("back"))]),
        )
        .await
        .unwrap();

    let result = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("route".to_string()),
            ALICE,
            step_data(&[]),
        )
        .await;
    assert!(matches!(result, Err(CoreError::NoTransitionFound(_))));
}

// Assignment templates route steps to principals chosen at runtime
#[tokio::test]
async fn templated_assignment_routes_to_submitted_approver() {
    let templated = r#"{
        "id": "wf_templated",
        "name": "Templated",
        "version": "1.0",
        "steps": [
            {"type": "start", "id": "start", "name": "Start", "next_step": "request"},
            {"type": "form", "id": "request", "name": "Request", "next_step": "review",
             "form": {"id": "f", "title": "Request",
                      "fields": [{"id": "approver", "label": "Approver", "type": "email",
                                  "required": true}]}},
            {"type": "form", "id": "review", "name": "Review",
             "assignedTo": "{{request.approver}}", "next_step": "end",
             "form": {"id": "g", "title": "Review", "fields": []}},
            {"type": "end", "id": "end", "name": "Done"}
        ]
    }"#;
    let h = harness(&[templated]);
    let instance = h
        .runner
        .start(&WorkflowId("wf_templated".to_string()), ALICE, "user_1")
        .await
        .unwrap();

    let instance = h
        .runner
        .submit_step(
            &instance.instance_id,
            &StepId("request".to_string()),
            ALICE,
            step_data(&[("approver", json!("boss@example.com"))]),
        )
        .await
        .unwrap();

    let review_record = instance.pending_record().unwrap();
    assert_eq!(
        review_record.assigned_to_email.as_deref(),
        Some("boss@example.com")
    );

    let pending = h.runner.pending_for("boss@example.com").await.unwrap();
    assert_eq!(pending.len(), 1);

    assert!(h
        .runner
        .validate_step_access(
            &instance.instance_id,
            &StepId("review".to_string()),
            "boss@example.com"
        )
        .await
        .is_ok());
    let denied = h
        .runner
        .validate_step_access(&instance.instance_id, &StepId("review".to_string()), ALICE)
        .await;
    assert!(matches!(denied, Err(CoreError::AccessDenied)));
}

//! Workflow API handlers
//!
//! Success responses use the `{"success": true, "data": ...}` envelope;
//! failures surface through the central error mapping in [`super::errors`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::ServerError;
use crate::server::RelayServer;
use relay_core::{InstanceFilter, InstanceId, InstanceStatus, StepId, WorkflowId, WorkflowInstance};

/// Maximum page size for instance listings
const MAX_LIST_LIMIT: usize = 500;

/// Default page size for instance listings
const DEFAULT_LIST_LIMIT: usize = 100;

/// Request body for starting a workflow instance
#[derive(Debug, Deserialize)]
pub struct StartInstanceRequest {
    workflow_id: Option<String>,
    user_email: Option<String>,
    user_id: Option<String>,
}

/// Request body for submitting step data
#[derive(Debug, Deserialize)]
pub struct SubmitStepRequest {
    user_email: Option<String>,
    step_data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Request body for cancelling an instance
#[derive(Debug, Deserialize)]
pub struct CancelInstanceRequest {
    user_email: Option<String>,
}

/// Query parameters carrying the acting user's email
#[derive(Debug, Deserialize)]
pub struct UserQuery {
    user_email: String,
}

/// Query parameters for instance listings
#[derive(Debug, Deserialize)]
pub struct InstancesQuery {
    status: Option<String>,
    initiated_by: Option<String>,
    assigned_to: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

/// Wire representation of an instance, matching the observed API shape
pub(crate) fn instance_payload(instance: &WorkflowInstance) -> serde_json::Value {
    let current_step = instance.pending_record().map(|record| {
        json!({
            "step_id": record.step_id,
            "step_name": record.step_name,
            "status": record.status,
            "assigned_to_email": record.assigned_to_email,
        })
    });

    json!({
        "instance_id": instance.instance_id,
        "workflow_id": instance.workflow_id,
        "workflow_name": instance.workflow_name,
        "current_step_id": instance.current_step_id,
        "current_step": current_step,
        "status": instance.status,
        "initiated_by_email": instance.initiated_by_email,
        "initiated_by_user_id": instance.initiated_by_user_id,
        "data": instance.data,
        "created_at": instance.created_at,
        "updated_at": instance.updated_at,
        "completed_at": instance.completed_at,
        "steps": instance.steps,
        "steps_count": instance.steps.len(),
    })
}

fn require(field: Option<String>, name: &str) -> Result<String, ServerError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ServerError::BadRequest(format!("{} is required", name))),
    }
}

/// Handler for `POST /v1/workflows/instances/start`
pub async fn start_instance_handler(
    State(server): State<Arc<RelayServer>>,
    Json(request): Json<StartInstanceRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let workflow_id = require(request.workflow_id, "workflow_id")?;
    let user_email = require(request.user_email, "user_email")?;
    let user_id = require(request.user_id, "user_id")?;

    let instance = server
        .runner()
        .start(&WorkflowId(workflow_id), &user_email, &user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Workflow instance started successfully",
            "data": {
                "instance_id": instance.instance_id,
                "workflow_id": instance.workflow_id,
                "workflow_name": instance.workflow_name,
                "current_step_id": instance.current_step_id,
                "status": instance.status,
                "created_at": instance.created_at,
            },
        })),
    ))
}

/// Handler for `GET /v1/workflows/instances/:instance_id`
pub async fn get_instance_handler(
    State(server): State<Arc<RelayServer>>,
    Path(instance_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let instance = server
        .runner()
        .get_instance(&InstanceId(instance_id))
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": instance_payload(&instance),
    })))
}

/// Handler for `GET /v1/workflows/instances`
pub async fn list_instances_handler(
    State(server): State<Arc<RelayServer>>,
    Query(query): Query<InstancesQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            InstanceStatus::parse(s)
                .ok_or_else(|| ServerError::BadRequest(format!("Unknown status: {}", s)))
        })
        .transpose()?;

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let filter = InstanceFilter {
        status,
        initiated_by: query.initiated_by,
        assigned_to: query.assigned_to,
        limit: Some(limit),
        offset,
    };
    let page = server.runner().list_instances(&filter).await?;

    let count = page.instances.len();
    let data: Vec<serde_json::Value> = page.instances.iter().map(instance_payload).collect();

    Ok(Json(json!({
        "success": true,
        "data": data,
        "pagination": {
            "total_count": page.total_count,
            "count": count,
            "limit": limit,
            "offset": offset,
            "has_more": offset + count < page.total_count,
        },
    })))
}

/// Handler for `GET /v1/workflows/instances/:instance_id/steps/:step_id/validate`
pub async fn validate_step_handler(
    State(server): State<Arc<RelayServer>>,
    Path((instance_id, step_id)): Path<(String, String)>,
    Query(user): Query<UserQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let access = server
        .runner()
        .validate_step_access(&InstanceId(instance_id), &StepId(step_id), &user.user_email)
        .await?;

    Ok(Json(json!({
        "success": true,
        "authorized": true,
        "data": {
            "step": access.step,
            "instance": instance_payload(&access.instance),
        },
    })))
}

/// Handler for `POST /v1/workflows/instances/:instance_id/steps/:step_id/submit`
pub async fn submit_step_handler(
    State(server): State<Arc<RelayServer>>,
    Path((instance_id, step_id)): Path<(String, String)>,
    Json(request): Json<SubmitStepRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let user_email = require(request.user_email, "user_email")?;
    let step_data = request
        .step_data
        .ok_or_else(|| ServerError::BadRequest("step_data is required".to_string()))?;

    let instance = server
        .runner()
        .submit_step(
            &InstanceId(instance_id),
            &StepId(step_id),
            &user_email,
            step_data,
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Step data submitted successfully",
        "data": {
            "instance": instance_payload(&instance),
        },
    })))
}

/// Handler for `POST /v1/workflows/instances/:instance_id/cancel`
pub async fn cancel_instance_handler(
    State(server): State<Arc<RelayServer>>,
    Path(instance_id): Path<String>,
    Json(request): Json<CancelInstanceRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let user_email = require(request.user_email, "user_email")?;

    let instance = server
        .runner()
        .cancel(&InstanceId(instance_id), &user_email)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Workflow instance cancelled",
        "data": {
            "instance": instance_payload(&instance),
        },
    })))
}

/// Handler for `GET /v1/workflows/pending`
pub async fn pending_workflows_handler(
    State(server): State<Arc<RelayServer>>,
    Query(user): Query<UserQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let pending = server.runner().pending_for(&user.user_email).await?;
    let count = pending.len();

    Ok(Json(json!({
        "success": true,
        "data": pending,
        "count": count,
    })))
}

/// Handler for `GET /v1/workflows`
pub async fn list_workflows_handler(
    State(server): State<Arc<RelayServer>>,
) -> Result<impl IntoResponse, ServerError> {
    let workflows = server.list_definitions().await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "workflows": workflows,
        },
    })))
}

/// Handler for `GET /v1/workflows/:workflow_id`
pub async fn get_workflow_handler(
    State(server): State<Arc<RelayServer>>,
    Path(workflow_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let workflow = server.get_definition(&WorkflowId(workflow_id)).await?;

    Ok(Json(json!({
        "success": true,
        "data": workflow,
    })))
}

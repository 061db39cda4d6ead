//! API module for the Relay Server
//!
//! This module contains the API routes and handlers.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod errors;
pub mod health;
pub mod workflows;

use crate::server::RelayServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<RelayServer>) -> Router {
    Router::new()
        // Workflow definitions
        .route("/v1/workflows", get(workflows::list_workflows_handler))
        .route("/v1/workflows/:workflow_id", get(workflows::get_workflow_handler))
        // Pending queue (polled by notification clients)
        .route("/v1/workflows/pending", get(workflows::pending_workflows_handler))
        // Instance lifecycle
        .route("/v1/workflows/instances", get(workflows::list_instances_handler))
        .route(
            "/v1/workflows/instances/start",
            post(workflows::start_instance_handler),
        )
        .route(
            "/v1/workflows/instances/:instance_id",
            get(workflows::get_instance_handler),
        )
        .route(
            "/v1/workflows/instances/:instance_id/cancel",
            post(workflows::cancel_instance_handler),
        )
        .route(
            "/v1/workflows/instances/:instance_id/steps/:step_id/validate",
            get(workflows::validate_step_handler),
        )
        .route(
            "/v1/workflows/instances/:instance_id/steps/:step_id/submit",
            post(workflows::submit_step_handler),
        )
        // Health check
        .route("/health", get(health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

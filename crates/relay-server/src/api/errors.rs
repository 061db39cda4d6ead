//! Error handling for the Relay Server API
//!
//! Central mapping from engine and server errors to HTTP responses, so
//! every handler surfaces the same status codes and body shapes.
//!
//! Access denial maps to 403 and is a recoverable signal: UI clients
//! redirect on it instead of rendering an error page. Step mismatches,
//! version conflicts, and terminal-instance writes map to 409. Malformed
//! definitions are server-side bugs and map to 500.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::error::ServerError;
use relay_core::CoreError;

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ServerError::Core(core) => core_error_response(core),
            ServerError::NotFound(resource) => error_response(
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{} not found", resource) }),
            ),
            ServerError::BadRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ServerError::Config(message) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("Configuration error: {}", message) }),
            ),
            ServerError::Internal(message) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            ),
        }
    }
}

/// Map a workflow engine error to its HTTP representation
fn core_error_response(err: CoreError) -> axum::response::Response {
    let (status, body) = match &err {
        CoreError::DefinitionNotFound(_)
        | CoreError::InstanceNotFound(_)
        | CoreError::StepNotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": err.to_string() })),

        CoreError::AccessDenied => (
            StatusCode::FORBIDDEN,
            json!({
                "error": "Not authorized to access this step",
                "authorized": false,
            }),
        ),

        CoreError::StepMismatch { .. } | CoreError::Terminal(_) | CoreError::Conflict(_) => {
            (StatusCode::CONFLICT, json!({ "error": err.to_string() }))
        }

        CoreError::Validation(fields) => (
            StatusCode::BAD_REQUEST,
            json!({
                "error": "Step data failed validation",
                "fields": fields,
            }),
        ),

        CoreError::DefinitionInvalid(_) | CoreError::NoTransitionFound(_) | CoreError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    };

    error_response(status, body)
}

fn error_response(status: StatusCode, body: serde_json::Value) -> axum::response::Response {
    (status, Json(body)).into_response()
}

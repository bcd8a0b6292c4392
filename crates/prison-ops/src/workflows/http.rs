//! Boundary mapping from workflow failures to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::error::{RepositoryError, WorkflowError};

pub fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::NotFound { .. } | WorkflowError::Repository(RepositoryError::NotFound) => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Conflict(_)
        | WorkflowError::CapacityExceeded { .. }
        | WorkflowError::InvalidStateTransition { .. }
        | WorkflowError::Repository(RepositoryError::Conflict)
        | WorkflowError::Repository(RepositoryError::CapacityReached(_)) => StatusCode::CONFLICT,
        WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
        WorkflowError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let mut payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        match &self {
            WorkflowError::Validation(errors) => {
                payload["validation_errors"] = json!(errors);
            }
            WorkflowError::CapacityExceeded {
                date,
                max_capacity,
                suggested_date,
            } => {
                payload["date"] = json!(date);
                payload["max_capacity"] = json!(max_capacity);
                payload["suggested_date"] = json!(suggested_date);
            }
            _ => {}
        }

        (status, axum::Json(payload)).into_response()
    }
}

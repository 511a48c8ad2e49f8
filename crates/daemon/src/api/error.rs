use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::PipelineError;

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Pipeline(err) => match err {
                PipelineError::Validation(_) | PipelineError::EmptyProject => {
                    StatusCode::BAD_REQUEST
                }
                PipelineError::AssetNotFound(_) | PipelineError::JobNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PipelineError::Provider { .. } | PipelineError::Exhausted { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                PipelineError::Timeout(_) | PipelineError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PipelineError::EngineExecution(_)
                | PipelineError::Io(_)
                | PipelineError::Http(_)
                | PipelineError::Store(_)
                | PipelineError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::NotFound(msg) | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Pipeline(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();
        if status.is_server_error() {
            error!(status = %status, error = %detail, "request failed");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use humanscore_core::PipelineError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub retryable: bool,
}

/// Turns pipeline failures into `{error, retryable}` bodies.
#[derive(Debug)]
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Transport { .. } | PipelineError::MalformedResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::Store(_) | PipelineError::Dropped => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, "request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

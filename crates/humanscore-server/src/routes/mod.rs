pub mod analyze;
pub mod health;
pub mod sessions;

use axum::extract::rejection::JsonRejection;
use axum::Router;
use humanscore_core::PipelineError;

use crate::error::ApiError;
use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/sessions", sessions::router())
        .merge(analyze::router())
        .merge(health::router())
}

/// Bad JSON bodies get the same `{error, retryable}` shape as other
/// invalid input.
pub(crate) fn rejected(rejection: JsonRejection) -> ApiError {
    ApiError(PipelineError::validation(rejection.body_text()))
}

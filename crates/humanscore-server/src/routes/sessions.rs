use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use humanscore_core::PipelineError;
use humanscore_schema::{SessionRecord, StepEvent};
use humanscore_store::SessionStore;
use serde::Serialize;

use super::rejected;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_session))
        .route("/{id}/steps", post(submit_step))
}

/// Resolves once the step's batch has been written.
async fn submit_step(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StepEvent>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(event) = body.map_err(rejected)?;
    state.coalescer.submit(&id, event).await?;
    Ok(Json(SubmitResponse {
        status: "persisted",
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionRecord>, Response> {
    match state.store.get(&id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND.into_response()),
        Err(e) => Err(ApiError(PipelineError::Store(e)).into_response()),
    }
}

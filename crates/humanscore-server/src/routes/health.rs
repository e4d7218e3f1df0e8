use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub providers: Vec<String>,
    pub baselines: Vec<String>,
    pub analysis_chain: Vec<String>,
    pub pending_steps: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.providers.as_ref().clone(),
        baselines: state
            .pipeline
            .baseline_providers()
            .into_iter()
            .map(String::from)
            .collect(),
        analysis_chain: state
            .pipeline
            .analysis_chain()
            .into_iter()
            .map(String::from)
            .collect(),
        pending_steps: state.coalescer.pending_len(),
    })
}

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use humanscore_schema::{AnalysisResult, AnalyzeRequest};
use serde::Serialize;

use super::rejected;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: AnalysisResult,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/analyze", post(analyze))
}

async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let Json(request) = body.map_err(rejected)?;
    let analysis = state.pipeline.analyze_submission(&request).await?;
    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use humanscore_store::InMemorySessionStore;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_support::offline_state;

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn empty_steps_is_invalid_input() {
        let app = router().with_state(offline_state(InMemorySessionStore::new()));
        let response = app
            .oneshot(post_json(serde_json::json!({"steps": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn no_reachable_provider_is_retryable_bad_gateway() {
        let app = router().with_state(offline_state(InMemorySessionStore::new()));
        let response = app
            .oneshot(post_json(serde_json::json!({
                "steps": [{
                    "sessionId": "s1", "stepNumber": 1, "questionType": "free_text",
                    "userResponse": "hello", "responseTimeMs": 2000,
                    "timestamp": "2025-06-01T12:00:00Z"
                }],
                "averageResponseTime": 2000
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["retryable"], true);
        assert!(body["error"].as_str().unwrap().contains("analysis unavailable"));
    }
}

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use humanscore_core::{
    AnalysisPipeline, AnalysisRequester, BaselineOrchestrator, BaselineProvider,
    BaselineProviderSpec, ChainLink, CoalescerConfig, FallbackChain,
};
use humanscore_provider::{LlmProvider, OpenAiProvider};
use humanscore_server::create_router;
use humanscore_server::state::AppState;
use humanscore_store::InMemorySessionStore;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANALYSIS: &str = r#"```json
{"metascore": 58,
 "subscores": {"creativity": 60, "spontaneity": 55, "consistency": 70, "emotionalDepth": 40, "unpredictability": 65},
 "personality": {"openness": 50, "warmth": 60, "impulsivity": 45, "analytical": 70, "playfulness": 35},
 "breakdown": [{"stepNumber": 1, "percentile": 58, "aiLikelihood": 35, "humanLikelihood": 65, "insight": "plain but personal"}]}
```"#;

async fn openai_mock(text: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
        })))
        .mount(&server)
        .await;
    server
}

fn provider(server: &MockServer) -> Arc<dyn LlmProvider> {
    Arc::new(OpenAiProvider::new("test-key", server.uri()))
}

fn step_json(n: u32, answer: &str) -> serde_json::Value {
    serde_json::json!({
        "sessionId": "quiz-1",
        "stepNumber": n,
        "questionType": "free_text",
        "question": "What did you have for breakfast?",
        "userResponse": answer,
        "responseTimeMs": 6500,
        "timestamp": "2025-06-01T12:00:00Z"
    })
}

fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn steps_then_analysis_round_trip() {
    let baseline = openai_mock("<answer_1>Toast with butter and a coffee.</answer_1>").await;
    let judge = openai_mock(ANALYSIS).await;

    let pipeline = AnalysisPipeline::new(
        BaselineOrchestrator::new(vec![BaselineProvider {
            spec: BaselineProviderSpec {
                name: "gpt".into(),
                provider_id: "openai".into(),
                model: "gpt-4o-mini".into(),
                temperature: 0.9,
                max_tokens: 256,
                timeout_ms: 5_000,
            },
            provider: provider(&baseline),
        }]),
        AnalysisRequester::new(FallbackChain::new(vec![ChainLink {
            label: "judge/gpt-4o".into(),
            provider: Some(provider(&judge)),
            model: "gpt-4o".into(),
            max_tokens: 2048,
            temperature: 0.2,
            timeout: std::time::Duration::from_secs(5),
        }])),
    );
    let store = InMemorySessionStore::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        CoalescerConfig {
            flush_threshold: 1,
            ..CoalescerConfig::default()
        },
        pipeline,
        vec!["openai".into()],
    );
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post(
            "/api/sessions/quiz-1/steps",
            step_json(1, "cold pizza, standing up"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/sessions/quiz-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["steps"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(post(
            "/api/analyze",
            serde_json::json!({
                "steps": record["steps"],
                "averageResponseTime": 6500
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["analysis"]["metascore"], 58.0);
    assert_eq!(
        body["analysis"]["breakdown"][0]["baselines"]["gpt"],
        "Toast with butter and a coffee."
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let health = body_json(response).await;
    assert_eq!(health["providers"], serde_json::json!(["openai"]));
    assert_eq!(health["analysisChain"], serde_json::json!(["judge/gpt-4o"]));
}

#[tokio::test]
async fn state_builds_from_workspace_config() {
    let tmp = tempfile::tempdir().unwrap();
    let root = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config");
    let mut config = humanscore_core::load_config(&root).unwrap();
    config.main.store.path = tmp.path().join("sessions.db").display().to_string();

    let state = AppState::from_config(&config, tmp.path()).unwrap();
    assert_eq!(state.coalescer.config().flush_threshold, 3);
    assert_eq!(state.pipeline.analysis_chain().len(), 2);
}

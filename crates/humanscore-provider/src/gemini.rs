//! Google Gemini API provider
//!
//! https://ai.google.dev/api/generate-content

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::{LlmProvider, LlmRequest, LlmResponse};

const PROVIDER: &str = "gemini";
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base(api_key, GEMINI_API_BASE)
    }

    pub fn with_base(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn build_request(request: &LlmRequest) -> GeminiRequest {
        let contents = request
            .messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| GeminiContent {
                role: match m.role.as_str() {
                    "assistant" => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction: request.system.as_ref().map(|s| GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart { text: s.clone() }],
            }),
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: request.temperature,
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, request.model, self.api_key
        );
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let payload = Self::build_request(&request);

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
            return Err(ProviderError::from_status(PROVIDER, status, detail));
        }

        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e, timeout))?;
        Ok(to_llm_response(body))
    }
}

fn to_llm_response(body: GeminiResponse) -> LlmResponse {
    let Some(candidate) = body.candidates.first() else {
        // Blocked prompts come back with no candidates; that is an empty answer.
        return LlmResponse {
            text: String::new(),
            input_tokens: body.usage_metadata.as_ref().map(|u| u.prompt_token_count),
            output_tokens: None,
            stop_reason: None,
        };
    };

    let text = candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<String>();

    let stop_reason = match candidate.finish_reason.as_deref() {
        Some("STOP") => Some("end_turn".to_string()),
        Some("MAX_TOKENS") => Some("max_tokens".to_string()),
        Some(r) => Some(r.to_lowercase()),
        None => None,
    };

    LlmResponse {
        text,
        input_tokens: body.usage_metadata.as_ref().map(|u| u.prompt_token_count),
        output_tokens: body
            .usage_metadata
            .as_ref()
            .map(|u| u.candidates_token_count),
        stop_reason,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: GeminiContent,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::{LlmMessage, LlmProvider, LlmRequest, LlmResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat-completions client. Also backs every OpenAI-compatible endpoint
/// (see `openai_compat`), so the reported name is configurable.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    name: String,
    api_key: String,
    api_base: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self::named("openai", api_key, api_base)
    }

    pub fn named(
        name: impl Into<String>,
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            name: name.into(),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn to_api_request(request: LlmRequest) -> ApiRequest {
        ApiRequest {
            model: request.model,
            messages: to_api_messages(request.system, request.messages),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
        }
    }
}

fn to_api_messages(system: Option<String>, messages: Vec<LlmMessage>) -> Vec<ApiMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(ApiMessage {
            role: "system".into(),
            content: Some(system),
        });
    }
    out.extend(messages.into_iter().map(|m| ApiMessage {
        role: m.role,
        content: Some(m.content),
    }));
    out
}

fn normalize_finish_reason(reason: Option<String>) -> Option<String> {
    reason.map(|r| match r.as_str() {
        "stop" => "end_turn".to_string(),
        "length" => "max_tokens".to_string(),
        _ => r,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let payload = Self::to_api_request(request);

        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, timeout))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiError>(&text)
                .ok()
                .map(|e| e.error.message);
            return Err(ProviderError::from_status(&self.name, status, detail));
        }

        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e, timeout))?;
        let choice = body.choices.into_iter().next();
        let (text, finish_reason) = match choice {
            Some(c) => (c.message.content.unwrap_or_default(), c.finish_reason),
            None => (String::new(), None),
        };

        Ok(LlmResponse {
            text,
            input_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
            stop_reason: normalize_finish_reason(finish_reason),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub choices: Vec<ApiChoice>,
    pub usage: Option<ApiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiChoice {
    pub message: ApiMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
}

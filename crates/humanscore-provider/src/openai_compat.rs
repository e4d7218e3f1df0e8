//! OpenAI-compatible providers (DeepSeek, Groq, OpenRouter, ...)
//!
//! These providers use the same API format as OpenAI, just with different base URLs.

use crate::OpenAiProvider;

/// DeepSeek API - OpenAI compatible
/// https://platform.deepseek.com/api-docs
pub fn deepseek(api_key: impl Into<String>) -> OpenAiProvider {
    OpenAiProvider::named("deepseek", api_key, "https://api.deepseek.com/v1")
}

/// Groq API - OpenAI compatible
/// https://console.groq.com/docs/api
pub fn groq(api_key: impl Into<String>) -> OpenAiProvider {
    OpenAiProvider::named("groq", api_key, "https://api.groq.com/openai/v1")
}

/// OpenRouter API - OpenAI compatible, multi-model router
/// https://openrouter.ai/docs
pub fn openrouter(api_key: impl Into<String>) -> OpenAiProvider {
    OpenAiProvider::named("openrouter", api_key, "https://openrouter.ai/api/v1")
}

/// Custom OpenAI-compatible endpoint
pub fn custom(
    name: impl Into<String>,
    api_key: impl Into<String>,
    base_url: impl Into<String>,
) -> OpenAiProvider {
    OpenAiProvider::named(name, api_key, base_url)
}

pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod openai_compat;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicProvider;
pub use error::{ProviderError, ProviderErrorKind, Result};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use openai_compat::{custom, deepseek, groq, openrouter};
pub use types::*;

/// "Send chat turns to a model, get plain text back."
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short transport name used in logs and error messages.
    fn name(&self) -> &str;

    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
}

// ============================================================
// Provider Configuration
// ============================================================

/// Provider type identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Anthropic,
    OpenAI,
    Gemini,
    DeepSeek,
    Groq,
    OpenRouter,
    /// Custom OpenAI-compatible endpoint
    Custom,
}

/// Configuration for a single provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider ID (e.g., "openai", "claude", "my-gateway")
    #[serde(alias = "provider_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Empty or missing means the credential is absent.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom base URL (optional, uses default for each provider type)
    #[serde(default, alias = "api_base")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(id: impl Into<String>, provider_type: ProviderType) -> Self {
        Self {
            id: id.into(),
            provider_type,
            api_key: None,
            base_url: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn credential(&self) -> Result<String> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(ProviderError::MissingCredential {
                provider: self.id.clone(),
            }),
        }
    }
}

/// Create a provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let key = config.credential()?;
    let base = config.base_url.as_deref();
    let provider: Arc<dyn LlmProvider> = match config.provider_type {
        ProviderType::Anthropic => Arc::new(AnthropicProvider::new(
            key,
            base.unwrap_or("https://api.anthropic.com"),
        )),
        ProviderType::OpenAI => Arc::new(OpenAiProvider::new(
            key,
            base.unwrap_or("https://api.openai.com/v1"),
        )),
        ProviderType::Gemini => Arc::new(GeminiProvider::with_base(
            key,
            base.unwrap_or(gemini::GEMINI_API_BASE),
        )),
        ProviderType::DeepSeek => match base {
            Some(url) => Arc::new(custom("deepseek", key, url)),
            None => Arc::new(deepseek(key)),
        },
        ProviderType::Groq => match base {
            Some(url) => Arc::new(custom("groq", key, url)),
            None => Arc::new(groq(key)),
        },
        ProviderType::OpenRouter => match base {
            Some(url) => Arc::new(custom("openrouter", key, url)),
            None => Arc::new(openrouter(key)),
        },
        ProviderType::Custom => {
            let url = base.ok_or_else(|| ProviderError::Transport {
                provider: config.id.clone(),
                message: "custom provider requires base_url".into(),
            })?;
            Arc::new(custom(config.id.clone(), key, url))
        }
    };
    Ok(provider)
}

/// Register providers from a list of configurations. Providers without a
/// credential are skipped; their ids are returned so callers can report them.
pub fn register_from_configs(
    registry: &mut ProviderRegistry,
    configs: &[ProviderConfig],
) -> Vec<String> {
    let mut skipped = Vec::new();
    for config in configs {
        match create_provider(config) {
            Ok(provider) => {
                registry.register(&config.id, provider);
                tracing::info!("Registered provider: {} ({:?})", config.id, config.provider_type);
            }
            Err(e) => {
                tracing::warn!("skipping provider {}: {e}", config.id);
                skipped.push(config.id.clone());
            }
        }
    }
    skipped
}

// ============================================================
// Provider Registry
// ============================================================

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(id.into(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

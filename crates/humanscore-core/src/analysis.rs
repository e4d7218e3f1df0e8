use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use humanscore_provider::{LlmMessage, LlmProvider, LlmRequest, LlmResponse, ProviderRegistry};
use humanscore_schema::{AnalysisResult, Baselines, StepEvent};
use tokio::time::timeout;

use crate::config::{AnalysisConfig, AnalysisLinkConfig};
use crate::error::{PipelineError, Result};
use crate::extract::extract_as;
use crate::prompts::{analysis_prompt, analysis_system_prompt};

/// One candidate in the fallback chain. `provider` is `None` when the
/// provider has no credential; such links are skipped.
pub struct ChainLink {
    pub label: String,
    pub provider: Option<Arc<dyn LlmProvider>>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ChainLink {
    pub fn from_config(link: &AnalysisLinkConfig, registry: &ProviderRegistry) -> Self {
        Self {
            label: link.label(),
            provider: registry.get(&link.provider_id).ok(),
            model: link.model.clone(),
            max_tokens: link.max_tokens,
            temperature: link.temperature,
            timeout: Duration::from_millis(link.timeout_ms),
        }
    }
}

/// Ordered list of providers; each is tried at most once per call.
pub struct FallbackChain {
    links: Vec<ChainLink>,
}

impl FallbackChain {
    pub fn new(links: Vec<ChainLink>) -> Self {
        let mut seen = HashSet::new();
        let links = links
            .into_iter()
            .filter(|link| seen.insert(link.label.clone()))
            .collect();
        Self { links }
    }

    pub fn from_config(config: &AnalysisConfig, registry: &ProviderRegistry) -> Self {
        Self::new(
            config
                .chain
                .iter()
                .map(|link| ChainLink::from_config(link, registry))
                .collect(),
        )
    }

    pub fn labels(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.label.as_str()).collect()
    }

    /// Returns the first successful response and the label that produced it.
    pub async fn complete(&self, system: &str, user: &str) -> Result<(String, LlmResponse)> {
        let mut tried = Vec::new();
        let mut last_err = String::from("no provider in the chain is configured");

        for (idx, link) in self.links.iter().enumerate() {
            let Some(provider) = &link.provider else {
                tracing::warn!(link = %link.label, "analysis provider has no credential, skipping");
                continue;
            };
            tried.push(link.label.clone());

            let request = LlmRequest {
                model: link.model.clone(),
                system: Some(system.to_string()),
                messages: vec![LlmMessage::user(user)],
                max_tokens: link.max_tokens,
                temperature: Some(link.temperature),
                timeout: Some(link.timeout),
            };

            match timeout(link.timeout, provider.chat(request)).await {
                Ok(Ok(resp)) => {
                    if idx > 0 {
                        tracing::info!(
                            "fallback_triggered=true, from={}, to={}, attempt={}",
                            self.links[0].label,
                            link.label,
                            idx + 1
                        );
                    }
                    return Ok((link.label.clone(), resp));
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        link = %link.label,
                        retryable = e.is_retryable(),
                        "analysis provider failed: {e}"
                    );
                    last_err = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(
                        link = %link.label,
                        "analysis provider timed out after {}ms",
                        link.timeout.as_millis()
                    );
                    last_err = format!("{} timed out", link.label);
                }
            }
        }

        Err(PipelineError::Transport {
            tried: tried.join(" -> "),
            message: last_err,
        })
    }
}

pub struct AnalysisRequester {
    chain: FallbackChain,
}

impl AnalysisRequester {
    pub fn new(chain: FallbackChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// A response that cannot be turned into an `AnalysisResult` fails the
    /// call; the next link is only for transport failures.
    pub async fn analyze(
        &self,
        steps: &[StepEvent],
        baselines: &Baselines,
        average_response_time_ms: f64,
    ) -> Result<AnalysisResult> {
        let system = analysis_system_prompt();
        let user = analysis_prompt(steps, baselines, average_response_time_ms);
        let (label, resp) = self.chain.complete(&system, &user).await?;

        let mut result: AnalysisResult = extract_as(&resp.text).map_err(|e| {
            tracing::error!(link = %label, "analysis response unusable: {e}");
            PipelineError::MalformedResponse(e)
        })?;
        result.clamp_scores();

        if result.breakdown.len() < steps.len() {
            tracing::warn!(
                link = %label,
                expected = steps.len(),
                got = result.breakdown.len(),
                "analysis breakdown shorter than submission"
            );
        }
        Ok(result)
    }
}

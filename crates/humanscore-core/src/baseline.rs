use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use humanscore_provider::{LlmMessage, LlmProvider, LlmRequest, ProviderRegistry};
use humanscore_schema::{BaselineAnswerSet, Baselines, QuestionType, StepEvent};
use tokio::time::timeout;

use crate::config::BaselineProviderSpec;
use crate::prompts::{baseline_prompt, BASELINE_SYSTEM_PROMPT};
use crate::tagged::extract_section;

/// A quiz question as the baseline providers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineQuestion {
    pub step_number: u32,
    pub question_type: QuestionType,
    pub prompt: String,
    /// Only used to size the baseline answer.
    pub user_response: String,
}

impl BaselineQuestion {
    pub(crate) fn prompt_or_placeholder(&self) -> &str {
        if self.prompt.trim().is_empty() {
            "(question text not provided)"
        } else {
            &self.prompt
        }
    }
}

impl From<&StepEvent> for BaselineQuestion {
    fn from(step: &StepEvent) -> Self {
        Self {
            step_number: step.step_number,
            question_type: step.question_type,
            prompt: step.question.clone().unwrap_or_default(),
            user_response: step.user_response.clone(),
        }
    }
}

pub struct BaselineProvider {
    pub spec: BaselineProviderSpec,
    pub provider: Arc<dyn LlmProvider>,
}

/// A question a provider did not answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBaseline {
    pub provider: String,
    pub step_number: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BaselineReport {
    /// One entry per provider, possibly empty.
    pub baselines: Baselines,
    /// Providers whose call failed or timed out.
    pub failed: Vec<String>,
    pub missing: Vec<MissingBaseline>,
}

impl BaselineReport {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || !self.missing.is_empty()
    }
}

pub struct BaselineOrchestrator {
    providers: Vec<BaselineProvider>,
}

impl BaselineOrchestrator {
    pub fn new(providers: Vec<BaselineProvider>) -> Self {
        Self { providers }
    }

    /// Providers absent from the registry (no credential) are left out.
    pub fn from_config(specs: &[BaselineProviderSpec], registry: &ProviderRegistry) -> Self {
        let mut providers = Vec::with_capacity(specs.len());
        for spec in specs {
            match registry.get(&spec.provider_id) {
                Ok(provider) => providers.push(BaselineProvider {
                    spec: spec.clone(),
                    provider,
                }),
                Err(e) => {
                    tracing::warn!(baseline = %spec.name, "baseline provider skipped: {e}");
                }
            }
        }
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.spec.name.as_str()).collect()
    }

    /// One batched call per provider, all in flight at once. A failing
    /// provider contributes an empty answer set.
    pub async fn generate_baselines(&self, questions: &[BaselineQuestion]) -> BaselineReport {
        let mut report = BaselineReport::default();
        if questions.is_empty() {
            for p in &self.providers {
                report
                    .baselines
                    .insert(p.spec.name.clone(), BaselineAnswerSet::new());
            }
            return report;
        }

        let prompt = baseline_prompt(questions);
        let calls = self
            .providers
            .iter()
            .map(|p| ask_provider(p, prompt.clone(), questions));
        let outcomes = join_all(calls).await;

        for (p, outcome) in self.providers.iter().zip(outcomes) {
            let name = p.spec.name.clone();
            match outcome {
                Some((answers, missing)) => {
                    report.missing.extend(missing.into_iter().map(|step_number| {
                        MissingBaseline {
                            provider: name.clone(),
                            step_number,
                        }
                    }));
                    report.baselines.insert(name, answers);
                }
                None => {
                    report.failed.push(name.clone());
                    report.baselines.insert(name, BaselineAnswerSet::new());
                }
            }
        }

        tracing::info!(
            providers = self.providers.len(),
            failed = report.failed.len(),
            missing = report.missing.len(),
            "baselines generated"
        );
        report
    }
}

/// `None` when the call itself failed; otherwise the parsed answers and the
/// step numbers that had no usable block.
async fn ask_provider(
    p: &BaselineProvider,
    prompt: String,
    questions: &[BaselineQuestion],
) -> Option<(BaselineAnswerSet, Vec<u32>)> {
    let limit = Duration::from_millis(p.spec.timeout_ms);
    let request = LlmRequest {
        model: p.spec.model.clone(),
        system: Some(BASELINE_SYSTEM_PROMPT.to_string()),
        messages: vec![LlmMessage::user(prompt)],
        max_tokens: p.spec.max_tokens,
        temperature: Some(p.spec.temperature),
        timeout: Some(limit),
    };

    let text = match timeout(limit, p.provider.chat(request)).await {
        Ok(Ok(resp)) => resp.text,
        Ok(Err(e)) => {
            tracing::warn!(baseline = %p.spec.name, "baseline call failed: {e}");
            return None;
        }
        Err(_) => {
            tracing::warn!(
                baseline = %p.spec.name,
                "baseline call timed out after {}ms",
                p.spec.timeout_ms
            );
            return None;
        }
    };

    let mut answers = BaselineAnswerSet::new();
    let mut missing = Vec::new();
    for (i, question) in questions.iter().enumerate() {
        match extract_section(&text, i + 1).filter(|answer| !answer.is_empty()) {
            Some(answer) => {
                answers.insert(question.step_number, answer);
            }
            None => {
                tracing::warn!(
                    baseline = %p.spec.name,
                    step = question.step_number,
                    "baseline answer block missing"
                );
                missing.push(question.step_number);
            }
        }
    }
    Some((answers, missing))
}

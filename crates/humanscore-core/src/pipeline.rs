use std::collections::HashSet;

use humanscore_provider::ProviderRegistry;
use humanscore_schema::{AnalysisResult, AnalyzeRequest, StepEvent};
use uuid::Uuid;

use crate::analysis::{AnalysisRequester, FallbackChain};
use crate::baseline::{BaselineOrchestrator, BaselineQuestion};
use crate::config::MainConfig;
use crate::enrich::enrich;
use crate::error::{PipelineError, Result};

/// Baselines, comparison, enrichment: everything after the last answer.
pub struct AnalysisPipeline {
    baselines: BaselineOrchestrator,
    requester: AnalysisRequester,
}

impl AnalysisPipeline {
    pub fn new(baselines: BaselineOrchestrator, requester: AnalysisRequester) -> Self {
        Self {
            baselines,
            requester,
        }
    }

    pub fn from_config(main: &MainConfig, registry: &ProviderRegistry) -> Self {
        Self::new(
            BaselineOrchestrator::from_config(&main.baselines, registry),
            AnalysisRequester::new(FallbackChain::from_config(&main.analysis, registry)),
        )
    }

    pub fn baseline_providers(&self) -> Vec<&str> {
        self.baselines.provider_names()
    }

    pub fn analysis_chain(&self) -> Vec<&str> {
        self.requester.chain().labels()
    }

    pub async fn analyze_submission(&self, request: &AnalyzeRequest) -> Result<AnalysisResult> {
        validate_steps(&request.steps)?;
        let run_id = Uuid::new_v4();
        let average = request
            .average_response_time
            .filter(|avg| avg.is_finite() && *avg >= 0.0)
            .unwrap_or_else(|| mean_response_time(&request.steps));

        tracing::info!(%run_id, steps = request.steps.len(), "analysis started");

        let questions: Vec<BaselineQuestion> =
            request.steps.iter().map(BaselineQuestion::from).collect();
        let report = self.baselines.generate_baselines(&questions).await;
        if report.is_partial() {
            tracing::warn!(
                %run_id,
                failed = ?report.failed,
                missing = report.missing.len(),
                "continuing with partial baselines"
            );
        }

        let result = self
            .requester
            .analyze(&request.steps, &report.baselines, average)
            .await?;
        let result = enrich(result, &report.baselines);

        tracing::info!(%run_id, metascore = result.metascore, "analysis finished");
        Ok(result)
    }
}

fn validate_steps(steps: &[StepEvent]) -> Result<()> {
    if steps.is_empty() {
        return Err(PipelineError::validation("no steps submitted"));
    }
    let mut seen = HashSet::new();
    for step in steps {
        if step.step_number == 0 {
            return Err(PipelineError::validation("step number must be at least 1"));
        }
        if !seen.insert(step.step_number) {
            return Err(PipelineError::validation(format!(
                "step {} submitted more than once",
                step.step_number
            )));
        }
        if step.user_response.trim().is_empty() {
            return Err(PipelineError::validation(format!(
                "step {} has an empty response",
                step.step_number
            )));
        }
    }
    Ok(())
}

fn mean_response_time(steps: &[StepEvent]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    steps.iter().map(|s| s.response_time_ms as f64).sum::<f64>() / steps.len() as f64
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Kind of quiz prompt a step answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    FreeText,
    Choice,
    Ranking,
    Drawing,
    Timed,
    #[serde(other)]
    Other,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreeText => "free_text",
            Self::Choice => "choice",
            Self::Ranking => "ranking",
            Self::Drawing => "drawing",
            Self::Timed => "timed",
            Self::Other => "other",
        }
    }
}

/// One answered question, created by the UI the instant it is submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub session_id: String,
    pub step_number: u32,
    pub question_type: QuestionType,
    /// Prompt text shown to the user, when the UI sends it along.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Free text, or a structured payload serialized to JSON text.
    #[serde(deserialize_with = "string_or_json")]
    pub user_response: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

impl StepEvent {
    pub fn word_count(&self) -> usize {
        self.user_response.split_whitespace().count()
    }
}

/// Aggregates recomputed on every merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub step_count: usize,
    pub total_response_time_ms: u64,
    pub average_response_time_ms: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionMeta {
    pub fn from_steps(steps: &[StepEvent]) -> Self {
        let total: u64 = steps.iter().map(|s| s.response_time_ms).sum();
        let average = if steps.is_empty() {
            0.0
        } else {
            total as f64 / steps.len() as f64
        };
        Self {
            step_count: steps.len(),
            total_response_time_ms: total,
            average_response_time_ms: average,
            last_updated: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    #[serde(default)]
    pub steps: Vec<StepEvent>,
    #[serde(default)]
    pub meta: SessionMeta,
    #[serde(default)]
    pub steps_completed: u32,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            meta: SessionMeta::default(),
            steps_completed: 0,
            created_at: Utc::now(),
        }
    }

    /// Appends `events` after the existing steps and recomputes aggregates.
    /// With `dedupe_by_step`, events whose step number is already present are
    /// skipped. Returns how many events were appended.
    pub fn merge_steps(&mut self, events: &[StepEvent], dedupe_by_step: bool) -> usize {
        let mut appended = 0;
        for event in events {
            if dedupe_by_step
                && self
                    .steps
                    .iter()
                    .any(|s| s.step_number == event.step_number)
            {
                continue;
            }
            self.steps.push(event.clone());
            appended += 1;
        }
        self.meta = SessionMeta::from_steps(&self.steps);
        self.steps_completed = self
            .steps
            .iter()
            .map(|s| s.step_number)
            .max()
            .unwrap_or(0)
            .max(self.steps.len() as u32);
        appended
    }
}

/// Per provider: step number to that provider's answer text.
pub type BaselineAnswerSet = BTreeMap<u32, String>;

/// Provider name to its answer set.
pub type Baselines = BTreeMap<String, BaselineAnswerSet>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscores {
    pub creativity: f64,
    pub spontaneity: f64,
    pub consistency: f64,
    #[serde(alias = "emotional_depth")]
    pub emotional_depth: f64,
    pub unpredictability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    pub openness: f64,
    pub warmth: f64,
    pub impulsivity: f64,
    pub analytical: f64,
    pub playfulness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownItem {
    #[serde(alias = "step_number", alias = "step")]
    pub step_number: u32,
    pub percentile: f64,
    #[serde(alias = "ai_likelihood")]
    pub ai_likelihood: f64,
    #[serde(alias = "human_likelihood")]
    pub human_likelihood: f64,
    #[serde(default)]
    pub insight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    /// Provider name to its baseline answer; filled in after analysis.
    #[serde(default)]
    pub baselines: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub metascore: f64,
    pub subscores: Subscores,
    pub personality: Personality,
    #[serde(default)]
    pub breakdown: Vec<BreakdownItem>,
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

impl AnalysisResult {
    /// Forces every score into the 0-100 band.
    pub fn clamp_scores(&mut self) {
        self.metascore = clamp_score(self.metascore);

        let s = &mut self.subscores;
        for v in [
            &mut s.creativity,
            &mut s.spontaneity,
            &mut s.consistency,
            &mut s.emotional_depth,
            &mut s.unpredictability,
        ] {
            *v = clamp_score(*v);
        }

        let p = &mut self.personality;
        for v in [
            &mut p.openness,
            &mut p.warmth,
            &mut p.impulsivity,
            &mut p.analytical,
            &mut p.playfulness,
        ] {
            *v = clamp_score(*v);
        }

        for item in &mut self.breakdown {
            item.percentile = clamp_score(item.percentile);
            item.ai_likelihood = clamp_score(item.ai_likelihood);
            item.human_likelihood = clamp_score(item.human_likelihood);
        }
    }
}

/// Body accepted by the analysis endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub steps: Vec<StepEvent>,
    #[serde(default)]
    pub average_response_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, ms: u64) -> StepEvent {
        StepEvent {
            session_id: "s1".into(),
            step_number: n,
            question_type: QuestionType::FreeText,
            question: None,
            user_response: format!("answer {n}"),
            response_time_ms: ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn step_event_accepts_structured_response() {
        let raw = serde_json::json!({
            "sessionId": "abc",
            "stepNumber": 2,
            "questionType": "ranking",
            "userResponse": ["b", "a", "c"],
            "responseTimeMs": 4200,
            "timestamp": "2025-01-01T00:00:00Z"
        });
        let event: StepEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.user_response, r#"["b","a","c"]"#);
        assert_eq!(event.question_type, QuestionType::Ranking);
    }

    #[test]
    fn unknown_question_type_maps_to_other() {
        let qt: QuestionType = serde_json::from_str("\"slider\"").unwrap();
        assert_eq!(qt, QuestionType::Other);
    }

    #[test]
    fn merge_appends_and_recomputes_meta() {
        let mut record = SessionRecord::new("s1");
        record.merge_steps(&[step(1, 1000), step(2, 3000)], false);
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.meta.step_count, 2);
        assert_eq!(record.meta.total_response_time_ms, 4000);
        assert_eq!(record.meta.average_response_time_ms, 2000.0);
        assert_eq!(record.steps_completed, 2);

        record.merge_steps(&[step(3, 500)], false);
        let numbers: Vec<u32> = record.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn merge_keeps_duplicates_unless_deduping() {
        let mut record = SessionRecord::new("s1");
        record.merge_steps(&[step(1, 1000)], false);
        assert_eq!(record.merge_steps(&[step(1, 1000)], false), 1);
        assert_eq!(record.steps.len(), 2);

        let mut deduped = SessionRecord::new("s1");
        deduped.merge_steps(&[step(1, 1000)], true);
        assert_eq!(deduped.merge_steps(&[step(1, 1000), step(2, 10)], true), 1);
        assert_eq!(deduped.steps.len(), 2);
    }

    #[test]
    fn clamp_scores_bounds_everything() {
        let mut result: AnalysisResult = serde_json::from_value(serde_json::json!({
            "metascore": 140,
            "subscores": {"creativity": -5, "spontaneity": 50, "consistency": 50,
                          "emotionalDepth": 101, "unpredictability": 50},
            "personality": {"openness": 1, "warmth": 2, "impulsivity": 3,
                            "analytical": 4, "playfulness": 500},
            "breakdown": [{"stepNumber": 1, "percentile": 120, "aiLikelihood": -1,
                           "humanLikelihood": 30, "insight": "x"}]
        }))
        .unwrap();
        result.clamp_scores();
        assert_eq!(result.metascore, 100.0);
        assert_eq!(result.subscores.creativity, 0.0);
        assert_eq!(result.subscores.emotional_depth, 100.0);
        assert_eq!(result.personality.playfulness, 100.0);
        assert_eq!(result.breakdown[0].percentile, 100.0);
        assert_eq!(result.breakdown[0].ai_likelihood, 0.0);
    }

    #[test]
    fn breakdown_accepts_snake_case_keys() {
        let item: BreakdownItem = serde_json::from_value(serde_json::json!({
            "step_number": 4, "percentile": 10, "ai_likelihood": 20,
            "human_likelihood": 80
        }))
        .unwrap();
        assert_eq!(item.step_number, 4);
        assert!(item.insight.is_empty());
        assert!(item.highlight.is_none());
    }
}

//! Prompt text for the baseline and analysis calls.

use std::fmt::Write;

use humanscore_schema::{Baselines, StepEvent};

use crate::baseline::BaselineQuestion;
use crate::tagged::section_tags;

/// No baseline is asked to answer in fewer words than this.
pub const MIN_BASELINE_WORDS: usize = 10;
/// Baselines aim for the user's word count plus or minus this fraction.
pub const LENGTH_TOLERANCE: f64 = 0.2;

/// Response times outside this window are flagged in the analysis prompt.
pub const FAST_RESPONSE_MS: u64 = 100;
pub const SLOW_RESPONSE_MS: u64 = 10 * 60 * 1000;

pub const BASELINE_SYSTEM_PROMPT: &str = "\
You are taking a short personality quiz. Answer every question in the first \
person, the way a thoughtful adult would, without mentioning that you are an \
AI. Keep each answer inside the word range given for it and wrap it in the \
exact tags shown. Do not add anything outside the tags.";

/// Deterministic thresholds the analysis model maps to score bands.
pub const SCORING_RUBRIC: &str = "\
Scoring rubric (apply literally, then adjust by at most 10 points with judgement):
- ai_likelihood per step:
  - 80-100 when the user answer shares its main idea AND most of its phrasing with two or more baselines.
  - 60-79 when it shares the main idea with two or more baselines but the phrasing differs.
  - 30-59 when it overlaps with exactly one baseline.
  - 0-29 when it overlaps with none.
  - add 15 (cap 100) when a free-text answer over 40 words arrived in under 5000 ms.
- human_likelihood per step is 100 minus ai_likelihood.
- percentile per step: how unusual the answer is compared with the baselines, 0 = identical, 100 = nothing in common.
- subscores:
  - creativity: mean percentile over free_text and drawing steps.
  - spontaneity: 80-100 when average response time is under 8000 ms, 50-79 under 20000 ms, otherwise 20-49.
  - consistency: 70-100 when the answers describe one coherent persona, 40-69 with minor contradictions, otherwise 0-39.
  - emotional_depth: 70-100 when answers name feelings or personal stakes in most steps, 40-69 in some, otherwise 0-39.
  - unpredictability: mean human_likelihood over all steps.
- metascore: round(0.3 * mean human_likelihood + 0.2 * creativity + 0.15 * spontaneity + 0.15 * emotional_depth + 0.2 * unpredictability).
- personality axes (openness, warmth, impulsivity, analytical, playfulness): 0-100 from the content of the answers alone.
All numbers are integers between 0 and 100.";

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You judge how human a set of quiz answers sounds by comparing each answer \
with answers written by several language models for the same question. \
Respond with a single JSON object and nothing else.";

const ANALYSIS_OUTPUT_SHAPE: &str = r#"Respond with JSON of exactly this shape:
{
  "metascore": 0,
  "subscores": {"creativity": 0, "spontaneity": 0, "consistency": 0, "emotionalDepth": 0, "unpredictability": 0},
  "personality": {"openness": 0, "warmth": 0, "impulsivity": 0, "analytical": 0, "playfulness": 0},
  "breakdown": [
    {"stepNumber": 1, "percentile": 0, "aiLikelihood": 0, "humanLikelihood": 0, "insight": "one sentence", "highlight": "optional short quote"}
  ]
}
Include one breakdown entry per step, in step order."#;

/// Inclusive word range a baseline answer should land in.
pub fn length_bounds(user_response: &str) -> (usize, usize) {
    let words = user_response.split_whitespace().count() as f64;
    let min = ((words * (1.0 - LENGTH_TOLERANCE)).round() as usize).max(MIN_BASELINE_WORDS);
    let max = ((words * (1.0 + LENGTH_TOLERANCE)).round() as usize).max(min);
    (min, max)
}

/// One user message covering every question; the i-th question (1-based) is
/// answered inside `<answer_i>` tags.
pub fn baseline_prompt(questions: &[BaselineQuestion]) -> String {
    let mut out = String::from("Answer each of the following questions.\n");
    for (i, q) in questions.iter().enumerate() {
        let index = i + 1;
        let (min, max) = length_bounds(&q.user_response);
        let (open, close) = section_tags(index);
        let _ = write!(
            out,
            "\nQuestion {index} ({kind}): {prompt}\nUse between {min} and {max} words.\nFormat: {open}your answer{close}\n",
            kind = q.question_type.as_str(),
            prompt = q.prompt_or_placeholder(),
        );
    }
    out
}

pub fn analysis_system_prompt() -> String {
    format!("{ANALYSIS_SYSTEM_PROMPT}\n\n{SCORING_RUBRIC}")
}

pub fn analysis_prompt(
    steps: &[StepEvent],
    baselines: &Baselines,
    average_response_time_ms: f64,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "The user answered {} questions. Average response time: {:.0} ms.",
        steps.len(),
        average_response_time_ms
    );

    for step in steps {
        let _ = write!(
            out,
            "\n## Step {n} ({kind})\n",
            n = step.step_number,
            kind = step.question_type.as_str()
        );
        if let Some(question) = step.question.as_deref().filter(|q| !q.trim().is_empty()) {
            let _ = writeln!(out, "Question: {question}");
        }
        let timing_note = if step.response_time_ms < FAST_RESPONSE_MS {
            " (unusually fast)"
        } else if step.response_time_ms > SLOW_RESPONSE_MS {
            " (unusually slow)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "User answer ({} ms{timing_note}): {}",
            step.response_time_ms, step.user_response
        );
        out.push_str("Baselines:\n");
        if baselines.is_empty() {
            out.push_str("- (no baselines available)\n");
        }
        for (provider, answers) in baselines {
            match answers.get(&step.step_number) {
                Some(text) => {
                    let _ = writeln!(out, "- {provider}: {text}");
                }
                None => {
                    let _ = writeln!(out, "- {provider}: (no answer)");
                }
            }
        }
    }

    out.push('\n');
    out.push_str(ANALYSIS_OUTPUT_SHAPE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use humanscore_schema::{BaselineAnswerSet, QuestionType};

    fn question(words: usize) -> BaselineQuestion {
        BaselineQuestion {
            step_number: 1,
            question_type: QuestionType::FreeText,
            prompt: "What would you do with a free afternoon?".into(),
            user_response: vec!["word"; words].join(" "),
        }
    }

    #[test]
    fn length_bounds_apply_tolerance_and_floor() {
        assert_eq!(length_bounds(&vec!["w"; 50].join(" ")), (40, 60));
        assert_eq!(length_bounds("just three words"), (10, 10));
        assert_eq!(length_bounds(""), (10, 10));
    }

    #[test]
    fn baseline_prompt_numbers_tags_from_one() {
        let prompt = baseline_prompt(&[question(50), question(5)]);
        assert!(prompt.contains("Question 1 (free_text)"));
        assert!(prompt.contains("<answer_1>your answer</answer_1>"));
        assert!(prompt.contains("<answer_2>your answer</answer_2>"));
        assert!(prompt.contains("between 40 and 60 words"));
        assert!(prompt.contains("between 10 and 10 words"));
    }

    #[test]
    fn analysis_prompt_lists_every_baseline() {
        let step = StepEvent {
            session_id: "s".into(),
            step_number: 2,
            question_type: QuestionType::Choice,
            question: Some("Cats or dogs?".into()),
            user_response: "dogs".into(),
            response_time_ms: 50,
            timestamp: Utc::now(),
        };
        let mut baselines = Baselines::new();
        baselines.insert("alpha".into(), BaselineAnswerSet::from([(2, "cats".into())]));
        baselines.insert("beta".into(), BaselineAnswerSet::new());

        let prompt = analysis_prompt(&[step], &baselines, 1234.4);
        assert!(prompt.contains("Average response time: 1234 ms"));
        assert!(prompt.contains("User answer (50 ms (unusually fast)): dogs"));
        assert!(prompt.contains("- alpha: cats"));
        assert!(prompt.contains("- beta: (no answer)"));
        assert!(prompt.contains("\"breakdown\""));
    }
}

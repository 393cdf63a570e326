use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::analysis::parse::parse_json_response;
use crate::analysis::prompts::{
    ANALYSIS_SYSTEM, EXPERIENCE_PROMPT_TEMPLATE, HEADLINE_PROMPT_TEMPLATE,
    LOGISTICS_PROMPT_TEMPLATE, SKILLS_PROMPT_TEMPLATE,
};
use crate::analysis::summary::{aggregate_score, build_summary};
use crate::llm_client::prompts::language_instruction;
use crate::llm_client::InferenceClient;
use crate::models::analysis::{ExperienceMatch, HeadlineMatch, LogisticsMatch, SkillsGap};
use crate::models::AnalysisResult;

/// Per-document cap on text embedded in a prompt, in characters.
pub const MAX_PROMPT_DOCUMENT_CHARS: usize = 6_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Headline,
    Skills,
    Experience,
    Logistics,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Headline => "headline",
            Dimension::Skills => "skills",
            Dimension::Experience => "experience",
            Dimension::Logistics => "logistics",
        }
    }

    fn template(self) -> &'static str {
        match self {
            Dimension::Headline => HEADLINE_PROMPT_TEMPLATE,
            Dimension::Skills => SKILLS_PROMPT_TEMPLATE,
            Dimension::Experience => EXPERIENCE_PROMPT_TEMPLATE,
            Dimension::Logistics => LOGISTICS_PROMPT_TEMPLATE,
        }
    }
}

/// Builds the prompt for one dimension with both documents length-capped.
pub fn build_prompt(
    dimension: Dimension,
    resume_text: &str,
    job_text: &str,
    language: Option<&str>,
) -> String {
    let language = language_instruction(language);
    fill_template(
        dimension.template(),
        &[
            ("{language_instruction}", language.as_str()),
            ("{resume_text}", truncate_chars(resume_text, MAX_PROMPT_DOCUMENT_CHARS)),
            ("{job_text}", truncate_chars(job_text, MAX_PROMPT_DOCUMENT_CHARS)),
        ],
    )
}

/// Substitutes placeholders in a single pass over the template, so braces
/// inside substituted values are never expanded again.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Fans out the four dimension calls and joins them into one result.
///
/// No timeout and no cancellation: every call runs to completion, and the
/// caller imposes any deadline it needs.
pub struct AnalysisOrchestrator {
    inference: Arc<dyn InferenceClient>,
}

impl AnalysisOrchestrator {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    /// Returns `None` if any of the four sub-analyses failed. Partial results
    /// are never surfaced.
    pub async fn analyze(
        &self,
        resume_text: &str,
        job_text: &str,
        language: Option<&str>,
    ) -> Option<AnalysisResult> {
        let (headline, skills, experience, logistics) = tokio::join!(
            self.run_dimension::<HeadlineMatch>(Dimension::Headline, resume_text, job_text, language),
            self.run_dimension::<SkillsGap>(Dimension::Skills, resume_text, job_text, language),
            self.run_dimension::<ExperienceMatch>(
                Dimension::Experience,
                resume_text,
                job_text,
                language
            ),
            self.run_dimension::<LogisticsMatch>(
                Dimension::Logistics,
                resume_text,
                job_text,
                language
            ),
        );

        let (Some(headline), Some(skills), Some(experience), Some(logistics)) =
            (headline, skills, experience, logistics)
        else {
            warn!("At least one sub-analysis failed; discarding the whole analysis");
            return None;
        };

        let mut result = AnalysisResult {
            overall_score: 0,
            headline,
            skills,
            experience,
            logistics,
            summary: String::new(),
            created_at: Utc::now(),
        };
        let scores = result.cores().map(|core| core.score);
        result.overall_score = aggregate_score(&scores);
        let summary = build_summary(result.overall_score, &result.cores());
        result.summary = summary;

        info!(
            overall_score = result.overall_score,
            headline = scores[0],
            skills = scores[1],
            experience = scores[2],
            logistics = scores[3],
            "Analysis completed"
        );

        Some(result)
    }

    async fn run_dimension<T: DeserializeOwned>(
        &self,
        dimension: Dimension,
        resume_text: &str,
        job_text: &str,
        language: Option<&str>,
    ) -> Option<T> {
        let prompt = build_prompt(dimension, resume_text, job_text, language);

        let raw = match self.inference.complete(&prompt, ANALYSIS_SYSTEM).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(dimension = dimension.as_str(), "Inference call failed: {e}");
                return None;
            }
        };

        let parsed = parse_json_response::<T>(&raw);
        if parsed.is_none() {
            warn!(
                dimension = dimension.as_str(),
                response_chars = raw.len(),
                "Could not parse inference response as JSON"
            );
        }
        parsed
    }
}

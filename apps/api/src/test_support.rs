//! Test doubles shared across module tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::analysis::Dimension;
use crate::llm_client::{InferenceClient, LlmError};

/// Answers each dimension prompt with a canned JSON body.
#[derive(Clone)]
pub struct ScriptedInference {
    scores: [u8; 4],
    garbage: Arc<Mutex<HashSet<&'static str>>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedInference {
    /// Scores in dimension order: headline, skills, experience, logistics.
    pub fn with_scores(scores: [u8; 4]) -> Self {
        Self {
            scores,
            garbage: Arc::default(),
            failing: Arc::default(),
            calls: Arc::default(),
        }
    }

    pub fn garbage_for(self, dimension: Dimension) -> Self {
        self.garbage.lock().unwrap().insert(dimension.as_str());
        self
    }

    pub fn failing_for(self, dimension: Dimension) -> Self {
        self.failing.lock().unwrap().insert(dimension.as_str());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn dimension_of(prompt: &str) -> (Dimension, usize) {
        if prompt.starts_with("HEADLINE") {
            (Dimension::Headline, 0)
        } else if prompt.starts_with("SKILLS") {
            (Dimension::Skills, 1)
        } else if prompt.starts_with("EXPERIENCE") {
            (Dimension::Experience, 2)
        } else {
            (Dimension::Logistics, 3)
        }
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, prompt: &str, _system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (dimension, index) = Self::dimension_of(prompt);

        if self.failing.lock().unwrap().contains(dimension.as_str()) {
            return Err(LlmError::Api {
                status: 529,
                message: "overloaded".to_string(),
            });
        }
        if self.garbage.lock().unwrap().contains(dimension.as_str()) {
            return Ok("Sorry, I can't produce JSON for this one.".to_string());
        }

        let body = format!(
            r#"{{"score": {}, "explanation": "{} looks fine", "problems": ["{} gap"], "recommendations": ["improve {}"]}}"#,
            self.scores[index],
            dimension.as_str(),
            dimension.as_str(),
            dimension.as_str()
        );
        // Vary the wrapping so the defensive parser is exercised end to end.
        Ok(match dimension {
            Dimension::Skills => format!("```json\n{body}\n```"),
            Dimension::Logistics => format!("Here is the analysis: {body} Hope it helps."),
            _ => body,
        })
    }
}

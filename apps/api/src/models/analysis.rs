//! Structured compatibility analysis attached to a completed request.
//!
//! Each of the four dimensions is produced by an independent inference call and
//! shares the same core shape: a 0–100 score, an explanation, and lists of
//! problems and recommendations. Dimension-specific extras are optional because
//! the model does not always return them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Fields common to every sub-analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisCore {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u8,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Headline / title match between the résumé and the posting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadlineMatch {
    #[serde(flatten)]
    pub core: AnalysisCore,
    #[serde(default)]
    pub resume_title: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsGap {
    #[serde(flatten)]
    pub core: AnalysisCore,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceMatch {
    #[serde(flatten)]
    pub core: AnalysisCore,
    #[serde(default)]
    pub candidate_years: Option<f32>,
    #[serde(default)]
    pub required_years: Option<f32>,
    #[serde(default)]
    pub seniority_fit: Option<String>,
}

/// Location, work format, salary and schedule compatibility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogisticsMatch {
    #[serde(flatten)]
    pub core: AnalysisCore,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub work_format: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

/// Composite result. Created once and never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub overall_score: u8,
    pub headline: HeadlineMatch,
    pub skills: SkillsGap,
    pub experience: ExperienceMatch,
    pub logistics: LogisticsMatch,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn cores(&self) -> [&AnalysisCore; 4] {
        [
            &self.headline.core,
            &self.skills.core,
            &self.experience.core,
            &self.logistics.core,
        ]
    }
}

/// Accepts integer, float or numeric-string scores and clamps them to 0–100.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawScore {
        Number(f64),
        Text(String),
    }

    let value = match RawScore::deserialize(deserializer)? {
        RawScore::Number(n) => n,
        RawScore::Text(s) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(serde::de::Error::custom)?,
    };
    if !value.is_finite() {
        return Err(serde::de::Error::custom("score must be a finite number"));
    }
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

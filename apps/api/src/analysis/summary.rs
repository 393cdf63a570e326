//! Deterministic aggregate score and summary text.

use crate::models::analysis::AnalysisCore;

const SUMMARY_PROBLEMS: usize = 3;
const SUMMARY_RECOMMENDATIONS: usize = 3;

/// `round(mean(scores))`; 0 for an empty slice.
pub fn aggregate_score(scores: &[u8]) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let sum: f64 = scores.iter().map(|s| f64::from(*s)).sum();
    (sum / scores.len() as f64).round().clamp(0.0, 100.0) as u8
}

pub fn score_band(score: u8) -> &'static str {
    match score {
        80..=u8::MAX => "Strong match",
        60..=79 => "Good match",
        40..=59 => "Partial match",
        _ => "Weak match",
    }
}

/// Band headline followed by the first few pooled problems and
/// recommendations, in dimension order.
pub fn build_summary(overall_score: u8, cores: &[&AnalysisCore]) -> String {
    let mut summary = format!("{} ({overall_score}/100).", score_band(overall_score));

    let problems: Vec<&str> = cores
        .iter()
        .flat_map(|c| c.problems.iter())
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .take(SUMMARY_PROBLEMS)
        .collect();
    let recommendations: Vec<&str> = cores
        .iter()
        .flat_map(|c| c.recommendations.iter())
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .take(SUMMARY_RECOMMENDATIONS)
        .collect();

    if !problems.is_empty() {
        summary.push_str("\n\nKey gaps:");
        for problem in problems {
            summary.push_str(&format!("\n- {problem}"));
        }
    }
    if !recommendations.is_empty() {
        summary.push_str("\n\nRecommendations:");
        for recommendation in recommendations {
            summary.push_str(&format!("\n- {recommendation}"));
        }
    }

    summary
}

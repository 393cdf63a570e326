use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Resume,
    JobPost,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::JobPost => "job_post",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resume" => Ok(DocumentType::Resume),
            "job_post" => Ok(DocumentType::JobPost),
            other => Err(format!(
                "Unknown document type '{other}' (expected 'resume' or 'job_post')"
            )),
        }
    }
}

/// Which conversion tier produced a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversionMethod {
    PlainText,
    InferenceConversion,
    LegacyFallback,
    RawFallback,
}

impl ConversionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionMethod::PlainText => "plain-text",
            ConversionMethod::InferenceConversion => "inference-conversion",
            ConversionMethod::LegacyFallback => "legacy-fallback",
            ConversionMethod::RawFallback => "raw-fallback",
        }
    }
}

/// Immutable extracted text of one uploaded résumé or job posting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub request_id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<usize>,
    pub text: String,
    pub word_count: usize,
    pub conversion_method: ConversionMethod,
    pub created_at: DateTime<Utc>,
}

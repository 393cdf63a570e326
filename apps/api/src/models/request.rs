use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::analysis::AnalysisResult;

/// Lifecycle of a matching request. Status only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Collecting,
    Processing,
    Completed,
    Error,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Collecting => "collecting",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Error => "error",
        }
    }

    /// Collecting and processing requests own the owner's active-request slot.
    pub fn is_active(self) -> bool {
        matches!(self, RequestStatus::Collecting | RequestStatus::Processing)
    }

    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Collecting, RequestStatus::Processing)
                | (RequestStatus::Processing, RequestStatus::Completed)
                | (RequestStatus::Processing, RequestStatus::Error)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One owner's matching job, persisted as JSON under `request:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    pub owner_id: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: RequestStatus,
    /// At most two ids, never two of the same document type.
    pub document_ids: Vec<Uuid>,
    pub analysis_result: Option<AnalysisResult>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub language: Option<String>,
}

impl Request {
    pub fn new(owner_id: &str, chat_id: &str, language: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            chat_id: chat_id.to_string(),
            created_at: now,
            last_activity: now,
            status: RequestStatus::Collecting,
            document_ids: Vec::new(),
            analysis_result: None,
            processed_at: None,
            error_message: None,
            language,
        }
    }

    /// Moves the request to `next`, rejecting any backward or skipping move.
    pub fn transition(&mut self, next: RequestStatus) -> Result<(), AppError> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "Request {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        tracing::info!(
            request_id = %self.id,
            from = self.status.as_str(),
            to = next.as_str(),
            "Request status transition"
        );
        self.status = next;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

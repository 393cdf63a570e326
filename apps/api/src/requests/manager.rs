//! Request manager. Owns the request state machine.
//!
//! collecting ──(second distinct document type)──▶ processing
//! processing ──(analysis ok)──▶ completed
//! processing ──(analysis failed)──▶ error
//! collecting/processing ──(cancel)──▶ deleted
//!
//! Completed and error are terminal; a fresh `create_request` is needed after.
//!
//! Known gap: the duplicate-type check in `add_document` is a read followed by
//! a write with no lock. Two concurrent uploads of the same type for the same
//! request can both pass the check, and the later request write wins.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::AnalysisOrchestrator;
use crate::conversion::DocumentPipeline;
use crate::errors::AppError;
use crate::models::{AnalysisResult, Document, DocumentType, Request, RequestStatus};
use crate::storage::Storage;

/// Upper bound accepted for a cleanup window (100 years).
const MAX_CLEANUP_WINDOW_HOURS: i64 = 100 * 365 * 24;

const ANALYSIS_FAILED_MESSAGE: &str =
    "The analysis could not be completed. Start a new request to try again.";

#[derive(Debug, Clone, Serialize)]
pub struct RequestDetails {
    pub request: Request,
    pub documents: Vec<Document>,
}

#[derive(Clone)]
pub struct RequestManager {
    storage: Storage,
    pipeline: Arc<DocumentPipeline>,
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl RequestManager {
    pub fn new(
        storage: Storage,
        pipeline: Arc<DocumentPipeline>,
        orchestrator: Arc<AnalysisOrchestrator>,
    ) -> Self {
        Self {
            storage,
            pipeline,
            orchestrator,
        }
    }

    /// Returns the owner's in-flight request if there is one, otherwise
    /// creates and indexes a new collecting request.
    pub async fn create_request(
        &self,
        owner_id: &str,
        chat_id: &str,
        language: Option<String>,
    ) -> Result<Request, AppError> {
        if owner_id.trim().is_empty() {
            return Err(AppError::Validation("owner_id cannot be empty".to_string()));
        }

        // The index may have been written moments ago by a previous call.
        let existing = self
            .storage
            .get_user_active_request_consistent(owner_id)
            .await?
            .filter(|r| r.status.is_active() && r.owner_id == owner_id);
        if let Some(existing) = existing {
            info!(request_id = %existing.id, owner_id, "Reusing active request");
            return Ok(existing);
        }

        let request = Request::new(owner_id, chat_id, language);
        self.storage.store_request(&request).await?;
        self.storage
            .set_user_active_request(owner_id, request.id)
            .await?;

        info!(request_id = %request.id, owner_id, "Created request");
        Ok(request)
    }

    /// Converts and attaches one document. Starts the analysis in the
    /// background once both document types are present.
    pub async fn add_document(
        &self,
        request_id: Uuid,
        doc_type: DocumentType,
        bytes: &[u8],
        filename: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<Document, AppError> {
        let mut request = self
            .storage
            .get_request_consistent(request_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("Request {request_id} not found")))?;

        if request.status != RequestStatus::Collecting {
            return Err(AppError::Validation(format!(
                "Request {request_id} is {} and no longer accepts documents. Start a new request.",
                request.status
            )));
        }

        // An unresolved id must not count as "type not present".
        let existing = self.storage.get_request_documents_strict(&request).await?;
        if existing.iter().any(|d| d.doc_type == doc_type) {
            return Err(AppError::Validation(format!("{doc_type} already provided")));
        }
        if request.document_ids.len() >= 2 {
            return Err(AppError::Validation(format!(
                "Request {request_id} already has both documents"
            )));
        }

        let document = self
            .pipeline
            .process_document(request_id, doc_type, bytes, filename, mime_type)
            .await?;

        request.document_ids.push(document.id);
        request.touch();
        self.storage.store_request(&request).await?;

        self.check_completion(request).await?;
        Ok(document)
    }

    /// Moves a collecting request with both document types to processing and
    /// spawns the analysis. The task is detached; nobody cancels it.
    /// Returns whether the analysis was started.
    async fn check_completion(&self, mut request: Request) -> Result<bool, AppError> {
        if request.status != RequestStatus::Collecting {
            return Ok(false);
        }

        let documents = self
            .storage
            .get_request_documents_consistent(&request)
            .await?;
        let find = |t: DocumentType| documents.iter().find(|d| d.doc_type == t);
        let (Some(resume), Some(job_post)) = (find(DocumentType::Resume), find(DocumentType::JobPost))
        else {
            return Ok(false);
        };
        let resume_text = resume.text.clone();
        let job_text = job_post.text.clone();

        request.transition(RequestStatus::Processing)?;
        self.storage.store_request(&request).await?;

        let manager = self.clone();
        tokio::spawn(async move {
            manager
                .run_analysis(request.id, resume_text, job_text, request.language)
                .await;
        });
        Ok(true)
    }

    async fn run_analysis(
        &self,
        request_id: Uuid,
        resume_text: String,
        job_text: String,
        language: Option<String>,
    ) {
        info!(request_id = %request_id, "Starting analysis");
        let result = self
            .orchestrator
            .analyze(&resume_text, &job_text, language.as_deref())
            .await;

        if let Err(e) = self.finish_analysis(request_id, result).await {
            error!(request_id = %request_id, "Failed to record analysis outcome: {e}");
            if let Err(e) = self.mark_error(request_id).await {
                error!(request_id = %request_id, "Failed to mark request as error: {e}");
            }
        }
    }

    async fn finish_analysis(
        &self,
        request_id: Uuid,
        result: Option<AnalysisResult>,
    ) -> Result<(), AppError> {
        let Some(mut request) = self
            .storage
            .get_request_where(request_id, |r| r.status != RequestStatus::Collecting)
            .await?
        else {
            warn!(request_id = %request_id, "Request gone before analysis finished; dropping result");
            return Ok(());
        };

        if request.status != RequestStatus::Processing {
            warn!(
                request_id = %request_id,
                status = request.status.as_str(),
                "Request already left processing; dropping analysis result"
            );
            return Ok(());
        }

        match result {
            Some(analysis) => {
                request.transition(RequestStatus::Completed)?;
                request.analysis_result = Some(analysis);
            }
            None => {
                request.transition(RequestStatus::Error)?;
                request.error_message = Some(ANALYSIS_FAILED_MESSAGE.to_string());
            }
        }
        request.processed_at = Some(Utc::now());

        self.storage.store_request(&request).await?;
        self.storage
            .clear_user_active_request(&request.owner_id, request.id)
            .await?;
        Ok(())
    }

    /// Catch path for failures while recording the outcome.
    async fn mark_error(&self, request_id: Uuid) -> Result<(), AppError> {
        let Some(mut request) = self.storage.get_request(request_id).await? else {
            return Ok(());
        };
        if request.status.can_transition_to(RequestStatus::Error) {
            request.transition(RequestStatus::Error)?;
            request.error_message = Some(ANALYSIS_FAILED_MESSAGE.to_string());
            request.processed_at = Some(Utc::now());
            self.storage.store_request(&request).await?;
        }
        self.storage
            .clear_user_active_request(&request.owner_id, request_id)
            .await?;
        Ok(())
    }

    /// Deletes the request and its documents. Returns false if it did not exist.
    pub async fn cancel_request(&self, request_id: Uuid) -> Result<bool, AppError> {
        let deleted = self.storage.delete_request(request_id).await?;
        if deleted {
            info!(request_id = %request_id, "Request cancelled");
        }
        Ok(deleted)
    }

    /// The owner's collecting or processing request, if any. Stale index
    /// entries pointing at finished requests are ignored.
    pub async fn get_active_request(&self, owner_id: &str) -> Result<Option<Request>, AppError> {
        let request = self.storage.get_user_active_request(owner_id).await?;
        Ok(request.filter(|r| r.status.is_active() && r.owner_id == owner_id))
    }

    pub async fn get_request_details(
        &self,
        request_id: Uuid,
    ) -> Result<Option<RequestDetails>, AppError> {
        let Some(request) = self.storage.get_request(request_id).await? else {
            return Ok(None);
        };
        let documents = self.storage.get_request_documents(&request).await?;
        Ok(Some(RequestDetails { request, documents }))
    }

    /// `None` until the request has completed.
    pub async fn get_analysis_result(
        &self,
        request_id: Uuid,
    ) -> Result<Option<AnalysisResult>, AppError> {
        let request = self.storage.get_request(request_id).await?;
        Ok(request
            .filter(|r| r.status == RequestStatus::Completed)
            .and_then(|r| r.analysis_result))
    }

    /// Intended for periodic invocation, not per message.
    pub async fn cleanup_old_requests(&self, older_than_hours: i64) -> Result<usize, AppError> {
        if !(0..=MAX_CLEANUP_WINDOW_HOURS).contains(&older_than_hours) {
            return Err(AppError::Validation(format!(
                "older_than_hours must be between 0 and {MAX_CLEANUP_WINDOW_HOURS}, got {older_than_hours}"
            )));
        }
        Ok(self
            .storage
            .cleanup_expired_requests(older_than_hours)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::analysis::Dimension;
    use crate::conversion::ConversionCapability;
    use crate::models::ConversionMethod;
    use crate::storage::MemoryKv;
    use crate::test_support::ScriptedInference;

    fn manager_with(inference: ScriptedInference, kv: MemoryKv) -> RequestManager {
        let storage = Storage::new(Arc::new(kv), None);
        let pipeline = Arc::new(DocumentPipeline::new(
            storage.clone(),
            ConversionCapability::Unavailable,
        ));
        let orchestrator = Arc::new(AnalysisOrchestrator::new(Arc::new(inference)));
        RequestManager::new(storage, pipeline, orchestrator)
    }

    fn manager() -> RequestManager {
        manager_with(ScriptedInference::with_scores([80, 60, 70, 90]), MemoryKv::new())
    }

    async fn wait_for_terminal(manager: &RequestManager, id: Uuid) -> Request {
        for _ in 0..200 {
            let request = manager.storage.get_request(id).await.unwrap().unwrap();
            if !request.status.is_active() {
                return request;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {id} never left processing");
    }

    const RESUME: &[u8] = b"5 years product management at a B2B SaaS company";
    const JOB_POST: &[u8] = b"Seeking PM with 3+ years of B2B experience";

    #[tokio::test]
    async fn test_create_request_starts_collecting() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        assert_eq!(request.status, RequestStatus::Collecting);
        assert!(request.document_ids.is_empty());
    }

    #[tokio::test]
    async fn test_create_request_is_idempotent_while_active() {
        let manager = manager();
        let first = manager.create_request("1", "chat-1", None).await.unwrap();
        let second = manager.create_request("1", "chat-1", None).await.unwrap();
        assert_eq!(first.id, second.id);

        let other = manager.create_request("2", "chat-2", None).await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_request_is_idempotent_under_visibility_lag() {
        let manager = manager_with(
            ScriptedInference::with_scores([70, 70, 70, 70]),
            MemoryKv::with_visibility_lag(1),
        );
        let first = manager.create_request("1", "chat-1", None).await.unwrap();
        let second = manager.create_request("1", "chat-1", None).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_end_to_end_analysis_completes() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", Some("en".into())).await.unwrap();

        let resume = manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();
        assert_eq!(resume.conversion_method, ConversionMethod::PlainText);
        let after_first = manager.storage.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(after_first.status, RequestStatus::Collecting);
        assert!(manager.get_analysis_result(request.id).await.unwrap().is_none());

        manager
            .add_document(request.id, DocumentType::JobPost, JOB_POST, None, None)
            .await
            .unwrap();

        let finished = wait_for_terminal(&manager, request.id).await;
        assert_eq!(finished.status, RequestStatus::Completed);
        assert!(finished.processed_at.is_some());
        assert_eq!(finished.document_ids.len(), 2);

        let result = manager.get_analysis_result(request.id).await.unwrap().unwrap();
        assert_eq!(result.overall_score, 75);
        assert!(result.overall_score <= 100);

        // Index cleared, so the next create starts fresh
        assert!(manager.get_active_request("1").await.unwrap().is_none());
        let next = manager.create_request("1", "chat-1", None).await.unwrap();
        assert_ne!(next.id, request.id);
    }

    #[tokio::test]
    async fn test_duplicate_document_type_is_rejected() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();

        let err = manager
            .add_document(request.id, DocumentType::Resume, b"another resume", None, None)
            .await
            .unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "resume already provided"),
            other => panic!("expected validation error, got {other:?}"),
        }

        let stored = manager.storage.get_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.document_ids.len(), 1);
        assert_eq!(stored.status, RequestStatus::Collecting);
    }

    #[tokio::test]
    async fn test_add_document_to_missing_request_fails() {
        let manager = manager();
        let err = manager
            .add_document(Uuid::new_v4(), DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("not found")));
    }

    #[tokio::test]
    async fn test_garbage_sub_analysis_marks_request_error() {
        let inference =
            ScriptedInference::with_scores([80, 60, 70, 90]).garbage_for(Dimension::Experience);
        let manager = manager_with(inference, MemoryKv::new());
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();
        manager
            .add_document(request.id, DocumentType::JobPost, JOB_POST, None, None)
            .await
            .unwrap();

        let finished = wait_for_terminal(&manager, request.id).await;
        assert_eq!(finished.status, RequestStatus::Error);
        assert!(finished.error_message.is_some());
        assert!(manager.get_analysis_result(request.id).await.unwrap().is_none());
        assert!(manager.get_active_request("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_request_rejects_documents() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();
        manager
            .add_document(request.id, DocumentType::JobPost, JOB_POST, None, None)
            .await
            .unwrap();
        wait_for_terminal(&manager, request.id).await;

        let err = manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("no longer accepts")));
    }

    #[tokio::test]
    async fn test_cancel_deletes_request_documents_and_index() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        let document = manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();

        assert!(manager.cancel_request(request.id).await.unwrap());
        assert!(manager.get_request_details(request.id).await.unwrap().is_none());
        assert!(manager.storage.get_document(document.id).await.unwrap().is_none());
        assert!(manager.get_active_request("1").await.unwrap().is_none());
        assert!(!manager.cancel_request(request.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_request_details_include_documents() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        manager
            .add_document(request.id, DocumentType::JobPost, JOB_POST, None, None)
            .await
            .unwrap();

        let details = manager.get_request_details(request.id).await.unwrap().unwrap();
        assert_eq!(details.documents.len(), 1);
        assert_eq!(details.documents[0].doc_type, DocumentType::JobPost);
    }

    #[tokio::test]
    async fn test_conversion_failure_leaves_request_unchanged() {
        let manager = manager();
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        let err = manager
            .add_document(
                request.id,
                DocumentType::Resume,
                b"PK\x03\x04 binary",
                Some("cv.docx"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conversion(_)));

        let stored = manager.storage.get_request(request.id).await.unwrap().unwrap();
        assert!(stored.document_ids.is_empty());
    }

    #[tokio::test]
    async fn test_flow_survives_eventual_consistency() {
        let manager = manager_with(
            ScriptedInference::with_scores([70, 70, 70, 70]),
            MemoryKv::with_visibility_lag(1),
        );
        let request = manager.create_request("1", "chat-1", None).await.unwrap();
        manager
            .add_document(request.id, DocumentType::Resume, RESUME, None, None)
            .await
            .unwrap();
        manager
            .add_document(request.id, DocumentType::JobPost, JOB_POST, None, None)
            .await
            .unwrap();

        let mut finished = None;
        for _ in 0..200 {
            if let Some(result) = manager.get_analysis_result(request.id).await.unwrap() {
                finished = Some(result);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(finished.map(|r| r.overall_score), Some(70));
    }

    #[tokio::test]
    async fn test_cleanup_rejects_out_of_range_window() {
        let manager = manager();
        manager.create_request("1", "chat-1", None).await.unwrap();

        for hours in [-1, i64::MAX, MAX_CLEANUP_WINDOW_HOURS + 1] {
            assert!(matches!(
                manager.cleanup_old_requests(hours).await,
                Err(AppError::Validation(_))
            ));
        }
        assert_eq!(manager.cleanup_old_requests(24).await.unwrap(), 0);
        assert!(manager.get_active_request("1").await.unwrap().is_some());
    }
}

//! Axum route handlers for the Request API.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{AnalysisResult, Document, DocumentType, Request};
use crate::requests::RequestDetails;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request bodies
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub owner_id: String,
    pub chat_id: String,
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TextDocumentBody {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchDocumentBody {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub file_ref: String,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/requests
///
/// Returns the owner's in-flight request if one exists, otherwise a new one.
pub async fn handle_create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<Request>, AppError> {
    let request = state
        .manager
        .create_request(&body.owner_id, &body.chat_id, body.language)
        .await?;
    Ok(Json(request))
}

/// GET /api/v1/requests/active?owner_id=
pub async fn handle_get_active_request(
    State(state): State<AppState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Request>, AppError> {
    state
        .manager
        .get_active_request(&params.owner_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No active request for {}", params.owner_id)))
}

/// GET /api/v1/requests/:id
pub async fn handle_get_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RequestDetails>, AppError> {
    state
        .manager
        .get_request_details(request_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Request {request_id} not found")))
}

/// DELETE /api/v1/requests/:id
pub async fn handle_cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.manager.cancel_request(request_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Request {request_id} not found")))
    }
}

/// GET /api/v1/requests/:id/analysis
///
/// 404 until the request has completed.
pub async fn handle_get_analysis(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<AnalysisResult>, AppError> {
    state
        .manager
        .get_analysis_result(request_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("Analysis for request {request_id} is not available"))
        })
}

/// POST /api/v1/requests/:id/documents (multipart: `type`, `file`)
pub async fn handle_upload_document(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Document>, AppError> {
    let mut doc_type: Option<DocumentType> = None;
    let mut file: Option<(Vec<u8>, Option<String>, Option<String>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read multipart field: {e}")))?
    {
        match field.name() {
            Some("type") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid type field: {e}")))?;
                doc_type = Some(raw.trim().parse().map_err(AppError::Validation)?);
            }
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
                file = Some((bytes.to_vec(), filename, mime_type));
            }
            _ => {}
        }
    }

    let doc_type =
        doc_type.ok_or_else(|| AppError::Validation("Missing 'type' field".to_string()))?;
    let (bytes, filename, mime_type) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;

    let document = state
        .manager
        .add_document(
            request_id,
            doc_type,
            &bytes,
            filename.as_deref(),
            mime_type.as_deref(),
        )
        .await?;
    Ok(Json(document))
}

/// POST /api/v1/requests/:id/documents/text
pub async fn handle_add_text_document(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<TextDocumentBody>,
) -> Result<Json<Document>, AppError> {
    if body.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }
    let document = state
        .manager
        .add_document(request_id, body.doc_type, body.text.as_bytes(), None, None)
        .await?;
    Ok(Json(document))
}

/// POST /api/v1/requests/:id/documents/fetch
///
/// Pulls the file through the configured `FileFetcher` and adds it.
pub async fn handle_fetch_document(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(body): Json<FetchDocumentBody>,
) -> Result<Json<Document>, AppError> {
    let fetcher = state.file_fetcher.as_ref().ok_or_else(|| {
        AppError::Validation(
            "File fetching is not configured. Upload the file or paste its text.".to_string(),
        )
    })?;

    let bytes = fetcher.fetch(&body.file_ref).await?;
    let filename = body
        .filename
        .or_else(|| body.file_ref.rsplit('/').next().map(str::to_string));

    let document = state
        .manager
        .add_document(
            request_id,
            body.doc_type,
            &bytes,
            filename.as_deref(),
            body.mime_type.as_deref(),
        )
        .await?;
    Ok(Json(document))
}

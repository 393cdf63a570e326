//! Axum route handlers for the Admin API.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admin::AuthOutcome;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginBody {
    pub owner_id: String,
    pub chat_id: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct OwnerBody {
    pub owner_id: String,
}

#[derive(Deserialize)]
pub struct CleanupBody {
    pub owner_id: String,
    pub older_than_hours: Option<i64>,
}

#[derive(Serialize)]
pub struct AdminStatusResponse {
    pub auth_required: bool,
    pub authenticated: bool,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: usize,
}

/// POST /api/v1/admin/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<AuthOutcome>, AppError> {
    let outcome = state
        .auth
        .authenticate(&body.owner_id, &body.chat_id, &body.password)
        .await?;
    if !outcome.success {
        return Err(AppError::Auth {
            message: outcome.message,
            cooldown_minutes: outcome.cooldown_minutes,
        });
    }
    Ok(Json(outcome))
}

/// POST /api/v1/admin/logout
pub async fn handle_logout(
    State(state): State<AppState>,
    Json(body): Json<OwnerBody>,
) -> Result<StatusCode, AppError> {
    state.auth.logout(&body.owner_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/status?owner_id=
pub async fn handle_status(
    State(state): State<AppState>,
    Query(params): Query<OwnerBody>,
) -> Result<Json<AdminStatusResponse>, AppError> {
    Ok(Json(AdminStatusResponse {
        auth_required: state.auth.is_auth_required(),
        authenticated: state.auth.is_authenticated(&params.owner_id).await?,
    }))
}

/// POST /api/v1/admin/cleanup
///
/// Deletes requests idle for longer than `older_than_hours`
/// (default CLEANUP_AFTER_HOURS). Admin only.
pub async fn handle_cleanup(
    State(state): State<AppState>,
    Json(body): Json<CleanupBody>,
) -> Result<Json<CleanupResponse>, AppError> {
    if !state.auth.is_authenticated(&body.owner_id).await? {
        return Err(AppError::Unauthorized);
    }

    let hours = body
        .older_than_hours
        .unwrap_or(state.config.cleanup_after_hours);
    let deleted = state.manager.cleanup_old_requests(hours).await?;
    info!(owner_id = body.owner_id, deleted, hours, "Manual cleanup run");
    Ok(Json(CleanupResponse { deleted }))
}

//! Session HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/sessions                        - List sessions with messages
//! - GET    /api/v1/sessions/last                   - Highest session id (0 if none)
//! - GET    /api/v1/sessions/{id}                   - Get a single session
//! - GET    /api/v1/sessions/{id}/history           - Ordered turns (null if none)
//! - DELETE /api/v1/sessions/{id}                   - Delete a session and its turns
//! - PUT    /api/v1/sessions/{id}/title             - Rename a session
//! - POST   /api/v1/sessions/{id}/title/generate    - Title an untitled session
//! - PUT    /api/v1/sessions/{id}/lock              - Set the limit flag
//! - GET    /api/v1/sessions/{id}/limited           - Read the limit flag

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use parley_types::conversation::{Session, SessionSummary, Title, Turn};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TitleBody {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateTitleBody {
    /// The first message of the conversation.
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LastSession {
    pub session_id: i64,
}

#[derive(Debug, Serialize)]
pub struct Renamed {
    pub session_id: i64,
    pub renamed: bool,
}

#[derive(Debug, Serialize)]
pub struct Limited {
    pub session_id: i64,
    pub is_limited: bool,
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, AppError> {
    let start = Instant::now();
    let sessions = state.chat_service.list_sessions().await?;
    Ok(Json(ApiResponse::success(sessions, start)))
}

/// GET /api/v1/sessions/last
pub async fn last_session(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LastSession>>, AppError> {
    let start = Instant::now();
    let session_id = state.chat_service.last_session_id().await?;
    Ok(Json(ApiResponse::success(LastSession { session_id }, start)))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let start = Instant::now();
    let session = state.chat_service.get_session(id).await?;
    Ok(Json(ApiResponse::success(session, start)))
}

/// GET /api/v1/sessions/{id}/history
///
/// A session without turns yields `"data": null` rather than an error.
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Option<Vec<Turn>>>>, AppError> {
    let start = Instant::now();
    let history = state.chat_service.get_history(id).await?;
    Ok(Json(ApiResponse::success(history, start)))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    state.chat_service.delete_session(id).await?;
    Ok(Json(ApiResponse::success(
        serde_json::json!({ "deleted": true, "session_id": id }),
        start,
    )))
}

/// PUT /api/v1/sessions/{id}/title
pub async fn edit_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TitleBody>,
) -> Result<Json<ApiResponse<Renamed>>, AppError> {
    let start = Instant::now();
    let renamed = state.chat_service.edit_title(id, &body.title).await?;
    Ok(Json(ApiResponse::success(
        Renamed {
            session_id: id,
            renamed,
        },
        start,
    )))
}

/// POST /api/v1/sessions/{id}/title/generate
///
/// `"data": null` when the session is unknown or already titled.
pub async fn generate_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<GenerateTitleBody>,
) -> Result<Json<ApiResponse<Option<Title>>>, AppError> {
    let start = Instant::now();
    if body.message.trim().is_empty() {
        return Err(AppError::Validation("message is empty".to_string()));
    }
    let title = state.chat_service.generate_title(id, &body.message).await?;
    Ok(Json(ApiResponse::success(title, start)))
}

/// PUT /api/v1/sessions/{id}/lock
pub async fn lock_session(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Limited>>, AppError> {
    let start = Instant::now();
    state.chat_service.lock_session(id).await?;
    Ok(Json(ApiResponse::success(
        Limited {
            session_id: id,
            is_limited: true,
        },
        start,
    )))
}

/// GET /api/v1/sessions/{id}/limited
pub async fn is_limited(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Limited>>, AppError> {
    let start = Instant::now();
    let is_limited = state.chat_service.is_session_limited(id).await?;
    Ok(Json(ApiResponse::success(
        Limited {
            session_id: id,
            is_limited,
        },
        start,
    )))
}

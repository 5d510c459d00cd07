//! Session lifecycle, connection and conversation history endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::database::DatabaseTarget;
use crate::session::{AssistantSession, ConversationTurn};

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub started_at: String,
    pub turns: usize,
    pub connected: bool,
    /// Redacted connection target.
    pub database: Option<String>,
}

impl SessionResponse {
    fn from_session(session: &AssistantSession) -> Self {
        let conversation = session.conversation();
        Self {
            id: conversation.id().to_string(),
            started_at: conversation.started_at().to_rfc3339(),
            turns: conversation.len(),
            connected: session.is_connected(),
            database: session.connection().map(|c| c.target().to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    /// Connection string or SQLite path.
    pub database: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse<'a> {
    pub id: String,
    pub turns: &'a [ConversationTurn],
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// POST /sessions
pub async fn create_session(State(state): State<AppState>) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let mut session = AssistantSession::new();
    if let Some(target) = &state.default_target {
        session.connect(target).await?;
    }

    let (_, shared) = state.sessions.insert(session);
    let guard = shared.lock().await;
    Ok((StatusCode::CREATED, Json(SessionResponse::from_session(&guard))))
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let shared = state.session(&id)?;
    let guard = shared.lock().await;
    Ok(Json(SessionResponse::from_session(&guard)))
}

/// DELETE /sessions/:id
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("Session {} not found", id)))
    }
}

/// POST /sessions/:id/connect
pub async fn connect_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if req.database.trim().is_empty() {
        return Err(ApiError::bad_request("database cannot be empty"));
    }
    let target = DatabaseTarget::parse(&req.database)?;

    let shared = state.session(&id)?;
    let mut guard = shared.lock().await;
    guard.connect(&target).await?;
    info!("Session {} now targets {}", id, target);
    Ok(Json(SessionResponse::from_session(&guard)))
}

/// GET /sessions/:id/history
pub async fn get_history(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let shared = state.session(&id)?;
    let guard = shared.lock().await;
    let body = HistoryResponse {
        id,
        turns: guard.conversation().history(),
    };
    Ok(Json(body).into_response())
}

/// DELETE /sessions/:id/history
pub async fn clear_history(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let shared = state.session(&id)?;
    shared.lock().await.conversation_mut().clear();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sessions/:id/export?format=text|json
pub async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let shared = state.session(&id)?;
    let guard = shared.lock().await;
    let conversation = guard.conversation();

    let (content_type, extension, body) = match query.format.as_deref().unwrap_or("text") {
        "text" | "txt" => ("text/plain; charset=utf-8", "txt", conversation.export_text()),
        "json" => {
            let body = conversation
                .export_json()
                .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
            ("application/json", "json", body)
        }
        other => return Err(ApiError::bad_request(format!("unsupported export format: {}", other))),
    };

    let disposition = format!("attachment; filename=\"conversation-{}.{}\"", conversation.id(), extension);
    Ok((
        [(header::CONTENT_TYPE, content_type.to_string()), (header::CONTENT_DISPOSITION, disposition)],
        body,
    )
        .into_response())
}

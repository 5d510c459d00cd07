//! HTTP JSON API over sessions, exchanges and the SQL playground.

pub mod session_api;
pub mod sql_api;

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::{error, warn};

use crate::database::DatabaseTarget;
use crate::error::{AssistantError, GenerationFailureKind};
use crate::pipeline::Assistant;
use crate::session::{SessionRegistry, SharedSession};

pub use session_api::{
    clear_history, connect_session, create_session, delete_session, export_session, get_history, get_session,
};
pub use sql_api::{ask, describe_schema, run_sql};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub sessions: SessionRegistry,
    /// Connected to every new session when set.
    pub default_target: Option<DatabaseTarget>,
    pub narrate_by_default: bool,
}

impl AppState {
    pub fn new(assistant: Assistant, default_target: Option<DatabaseTarget>, narrate_by_default: bool) -> Self {
        Self {
            assistant: Arc::new(assistant),
            sessions: SessionRegistry::new(),
            default_target,
            narrate_by_default,
        }
    }

    pub(crate) fn session(&self, id: &str) -> Result<SharedSession, ApiError> {
        self.sessions
            .get(id)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Session {} not found", id)))
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        let status = match &err {
            AssistantError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AssistantError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AssistantError::Generation { kind, .. } => match kind {
                GenerationFailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                GenerationFailureKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            AssistantError::SchemaIntrospection(_) | AssistantError::Execution(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!("Request failed ({}): {}", err.category(), err);
        } else {
            warn!("Request rejected ({}): {}", err.category(), err);
        }
        Self::new(status, err.to_string())
    }
}

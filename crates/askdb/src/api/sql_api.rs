use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, AppState};
use crate::database::{QueryResult, TableSchema};
use crate::pipeline::Exchange;

const MAX_QUESTION_LEN: usize = 8_192;
const MAX_SQL_LEN: usize = 65_536;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Falls back to the server default when absent.
    pub narrate: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub tables: Vec<TableSchema>,
    pub text: String,
}

/// POST /sessions/:id/ask
pub async fn ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Exchange>, ApiError> {
    if req.question.len() > MAX_QUESTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Question too long (max {} bytes)",
            MAX_QUESTION_LEN
        )));
    }

    let shared = state.session(&id)?;
    let mut guard = shared.lock().await;
    let narrate = req.narrate.unwrap_or(state.narrate_by_default);
    info!("Session {}: asking (narrate={})", id, narrate);

    let exchange = state.assistant.ask(&mut guard, &req.question, narrate).await?;
    Ok(Json(exchange))
}

/// POST /sessions/:id/sql
pub async fn run_sql(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    if req.sql.len() > MAX_SQL_LEN {
        return Err(ApiError::bad_request(format!("SQL too long (max {} bytes)", MAX_SQL_LEN)));
    }

    let shared = state.session(&id)?;
    let guard = shared.lock().await;
    let result = state.assistant.run_sql(&guard, &req.sql).await?;
    Ok(Json(result))
}

/// GET /sessions/:id/schema
pub async fn describe_schema(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let shared = state.session(&id)?;
    let guard = shared.lock().await;
    let schema = state.assistant.describe(&guard).await?;
    let text = schema.to_string();
    Ok(Json(SchemaResponse {
        tables: schema.tables,
        text,
    }))
}

//! HTTP server bootstrap.

use std::time::Duration;

use anyhow::Context;
use axum::{
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::metrics;
use crate::pipeline::Assistant;

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Serve the HTTP API until the process is stopped.
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    metrics::init_metrics();
    cfg.print_config();

    let assistant = Assistant::from_config(&cfg).context("failed to initialize the language model client")?;
    let default_target = cfg.database_target()?;
    let state = AppState::new(assistant, default_target, cfg.narrate_results);

    let addr = cfg.api_addr()?;
    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let app = build_router(state, cfg.request_timeout());
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/sessions", post(api::create_session))
        .route("/sessions/:id", get(api::get_session).delete(api::delete_session))
        .route("/sessions/:id/connect", post(api::connect_session))
        .route("/sessions/:id/ask", post(api::ask))
        .route("/sessions/:id/sql", post(api::run_sql))
        .route("/sessions/:id/schema", get(api::describe_schema))
        .route("/sessions/:id/history", get(api::get_history).delete(api::clear_history))
        .route("/sessions/:id/export", get(api::export_session))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(metrics_text))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .map_response(|res: axum::response::Response<_>| res.map(axum::body::Body::new))
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                // Innermost, so it sees the router's own response body.
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_text(),
    )
}

/// api.rs — Axum route handlers.
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use crate::{
    error::BridgeError,
    line::{parse_events, SIGNATURE_HEADER},
    logging::Entry,
    state::AppState,
};

// ── Error helper ───────────────────────────────────────────────────────────────

/// Log at ERROR and echo the same record as the response body.
fn err(status: StatusCode, msg: impl Into<String>) -> Response {
    let message = msg.into();
    error!("{message}");
    (status, Json(Entry { message: &message, severity: "ERROR" })).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health",   get(health))
        .route("/callback", post(callback))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ── Health ─────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

// ── Webhook ────────────────────────────────────────────────────────────────────

pub async fn callback(State(st): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("webhook", request_id = %request_id);
    handle_callback(st, headers, body).instrument(span).await
}

async fn handle_callback(st: AppState, headers: HeaderMap, body: Bytes) -> Response {
    let deadline = Instant::now() + Duration::from_secs(st.cfg.deadline_s);

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let events = match parse_events(&st.cfg.secrets.line_channel_secret, signature, &body) {
        Ok(events) => events,
        Err(e @ BridgeError::Parse(_)) => return err(e.status_code(), e.to_string()),
        Err(e) => return err(e.status_code(), format!("Failed to parse request: {e}")),
    };

    let report = st.dispatcher.dispatch(&events, deadline).await;
    if !report.is_success() {
        return err(report.status_code(), report.summary());
    }

    info!("{}", report.summary());
    Json(json!({
        "status":   "ok",
        "received": report.received,
        "skipped":  report.skipped,
        "uploaded": report.uploaded.len(),
    }))
    .into_response()
}

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tracing::{error, info};

use crate::events;
use crate::middleware::Authenticated;
use crate::state::AppState;

// GET /api/health (no auth)
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /api/sources
pub async fn list_sources(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let store = state.pipeline.store();
    let (sources, chunks) = match (store.sources(), store.count()) {
        (Ok(sources), Ok(chunks)) => (sources, chunks),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to list sources");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let sources: Vec<serde_json::Value> = sources
        .into_iter()
        .map(|(source, chunks)| serde_json::json!({ "source": source, "chunks": chunks }))
        .collect();
    Ok(Json(serde_json::json!({ "sources": sources, "chunks": chunks })))
}

#[derive(Deserialize)]
pub struct IngestBody {
    pub source: String,
    pub text: String,
}

// POST /api/ingest
pub async fn ingest(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if body.source.trim().is_empty() || body.text.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.pipeline.ingest(&body.source, &body.text).await {
        Ok(chunks) => Ok(Json(serde_json::json!({
            "source": body.source,
            "chunks": chunks,
        }))),
        Err(e) => {
            error!(source = %body.source, error = %e, "Ingest failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Deserialize)]
pub struct AskBody {
    pub question: String,
}

// POST /api/ask
pub async fn ask(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if body.question.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let answer = state.pipeline.ask(&body.question).await.map_err(|e| {
        error!(error = %e, "Failed to build pipeline graph");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    serde_json::to_value(&answer).map(Json).map_err(|e| {
        error!(error = %e, "Failed to serialize answer");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// DELETE /api/sources/{source}
pub async fn forget_source(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.pipeline.store().delete_source(&source) {
        Ok(removed) => {
            info!(source = %source, removed, "Source removed");
            Ok(Json(serde_json::json!({ "removed": removed })))
        }
        Err(e) => {
            error!(source = %source, error = %e, "Failed to remove source");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /api/graph
pub async fn graph(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let graph = state.pipeline.graph().map_err(|e| {
        error!(error = %e, "Failed to build pipeline graph");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(serde_json::json!({
        "name": graph.name(),
        "start": graph.current_node(),
        "nodes": graph.node_names(),
        "edges": graph.table().to_edges(),
    })))
}

// GET /ws/events
pub async fn ws_events(
    ws: WebSocketUpgrade,
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let bus = state.event_bus.clone();
    ws.on_upgrade(move |socket| events::forward_events(socket, bus))
}

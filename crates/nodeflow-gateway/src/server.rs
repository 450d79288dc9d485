use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use nodeflow_core::config::GatewayConfig;
use nodeflow_core::event::EventBus;
use nodeflow_rag::RagPipeline;

use crate::routes;
use crate::state::AppState;

/// HTTP + WebSocket front end for the question-answering pipeline.
pub struct GatewayServer {
    config: GatewayConfig,
    pipeline: Arc<RagPipeline>,
    event_bus: Arc<EventBus>,
}

/// Build the axum router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/sources", get(routes::list_sources))
        .route("/api/sources/{source}", delete(routes::forget_source))
        .route("/api/ingest", post(routes::ingest))
        .route("/api/ask", post(routes::ask))
        .route("/api/graph", get(routes::graph))
        .route("/ws/events", get(routes::ws_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        pipeline: Arc<RagPipeline>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            pipeline,
            event_bus,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            pipeline: self.pipeline.clone(),
            event_bus: self.event_bus.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

use std::sync::Arc;

use nodeflow_core::config::GatewayConfig;
use nodeflow_core::event::EventBus;
use nodeflow_rag::RagPipeline;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub pipeline: Arc<RagPipeline>,
    pub event_bus: Arc<EventBus>,
}

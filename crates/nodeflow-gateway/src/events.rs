use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use nodeflow_core::event::EventBus;

/// Push every graph event to the socket as a JSON text frame until either
/// side goes away.
pub async fn forward_events(ws: WebSocket, event_bus: Arc<EventBus>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut event_rx = event_bus.subscribe();
    debug!("Event stream client connected");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event stream client lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Event stream client disconnected");
}

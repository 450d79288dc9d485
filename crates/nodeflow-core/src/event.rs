use serde::Serialize;

use crate::types::RunId;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Failed { error: String },
}

/// Graph event broadcast to all subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// `run` was called.
    RunStarted {
        graph: String,
        run_id: RunId,
        node: Option<String>,
    },
    /// A node is about to be invoked.
    NodeStarted {
        graph: String,
        node: String,
        transitions: Vec<String>,
    },
    /// A node returned.
    NodeCompleted {
        graph: String,
        node: String,
        patched: bool,
        transition: Option<String>,
        elapsed_ms: u64,
    },
    /// The pointer moved.
    Transitioned {
        graph: String,
        from: String,
        to: String,
    },
    /// A step reported "not continuing".
    Terminated {
        graph: String,
        node: Option<String>,
        outcome: Outcome,
    },
    /// `run` returned.
    RunFinished {
        graph: String,
        run_id: RunId,
        steps: usize,
        elapsed_ms: u64,
    },
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<GraphEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: GraphEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GraphEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(GraphEvent::Transitioned {
            graph: "g".into(),
            from: "a".into(),
            to: "b".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(GraphEvent::Terminated {
            graph: "g".into(),
            node: Some("a".into()),
            outcome: Outcome::Completed,
        });

        match rx.recv().await.unwrap() {
            GraphEvent::Terminated { node, outcome, .. } => {
                assert_eq!(node.as_deref(), Some("a"));
                assert_eq!(outcome, Outcome::Completed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = GraphEvent::Terminated {
            graph: "rag".into(),
            node: None,
            outcome: Outcome::Failed {
                error: "boom".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "terminated");
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["error"], "boom");
    }
}

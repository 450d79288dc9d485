use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeflowError {
    // Graph build errors
    #[error("Start node not registered: {0}")]
    UnknownStartNode(String),

    // Graph run errors
    #[error("Graph has no start node")]
    NotStarted,

    #[error("Invalid transition from {from} to {to} (available: {available:?})")]
    InvalidTransition {
        from: String,
        to: String,
        available: Vec<String>,
    },

    #[error("Transition target not registered: {0}")]
    UnknownNode(String),

    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Node panicked: {node}: {message}")]
    NodePanicked { node: String, message: String },

    #[error("Patch function panicked: {0}")]
    PatchPanicked(String),

    #[error("Graph exceeded max steps ({0})")]
    StepLimitExceeded(usize),

    // Context errors
    #[error("Patch must be a JSON object, got {0}")]
    InvalidPatch(String),

    #[error("Context key missing: {0}")]
    MissingKey(String),

    // Collaborator errors
    #[error("Generation request failed: {0}")]
    Generation(String),

    #[error("Generation provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("Embedding request failed: {0}")]
    Embedding(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NodeflowError {
    /// Shorthand for a node-level failure.
    pub fn node(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeflowError>;

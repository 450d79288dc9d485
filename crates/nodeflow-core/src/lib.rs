pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use context::{apply_patch, Context, ContextMap, Patch};
pub use error::{NodeflowError, Result};
pub use event::{EventBus, GraphEvent, Outcome};
pub use traits::{FnNode, Node, NodeOutput, TextGenerator, Transitions};
pub use types::*;

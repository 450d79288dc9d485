use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{Node, NodeOutput, Transitions};
use nodeflow_memory::embeddings::EmbeddingProvider;
use nodeflow_memory::store::VectorStore;

use crate::{DOCUMENTS, QUESTION};

/// Embeds the question and patches the closest stored chunks into `documents`.
pub struct RetrieveNode {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    next: Option<String>,
}

impl RetrieveNode {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn EmbeddingProvider>, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
            next: None,
        }
    }

    /// Continue to `name` after retrieving, when that edge is wired.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.next = Some(name.into());
        self
    }

    async fn retrieve(&self, question: &str) -> Result<serde_json::Value> {
        let vectors = self.embedder.embed(&[question.to_string()]).await?;
        let query = vectors
            .into_iter()
            .next()
            .ok_or_else(|| NodeflowError::Embedding("no embedding returned for question".into()))?;

        let hits = self.store.search(&query, self.top_k)?;
        info!(hits = hits.len(), top_k = self.top_k, "Retrieved documents");
        Ok(serde_json::to_value(&hits)?)
    }
}

impl Node for RetrieveNode {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin(async move {
            let question = context
                .get_str(QUESTION)
                .filter(|q| !q.trim().is_empty())
                .ok_or_else(|| NodeflowError::node("retrieve", "context has no question"))?;

            let documents = self.retrieve(question).await?;
            let mut output = NodeOutput::patch(Patch::set(DOCUMENTS, documents));

            match &self.next {
                Some(next) if transitions.contains(next) => {
                    output.transition = Some(next.clone());
                }
                Some(next) => debug!(next = %next, "Successor not wired, stopping after retrieval"),
                None => {}
            }
            Ok(Some(output))
        })
    }
}

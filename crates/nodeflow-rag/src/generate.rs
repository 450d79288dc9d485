use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use nodeflow_core::config::ModelConfig;
use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{Node, NodeOutput, TextGenerator, Transitions};
use nodeflow_core::types::GenerationRequest;
use nodeflow_memory::store::ScoredChunk;

use crate::prompt::{build_answer_prompt, DEFAULT_SYSTEM_PROMPT};
use crate::{ANSWER, DOCUMENTS, QUESTION};

/// Answers the question from whatever `documents` are in the context.
///
/// Works without documents too, which is how the router's direct path
/// reaches it.
pub struct GenerateNode {
    generator: Arc<dyn TextGenerator>,
    model: ModelConfig,
    system_prompt: String,
    next: Option<String>,
}

impl GenerateNode {
    pub fn new(generator: Arc<dyn TextGenerator>, model: ModelConfig) -> Self {
        Self {
            generator,
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            next: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Continue to `name` after answering, when that edge is wired.
    pub fn then(mut self, name: impl Into<String>) -> Self {
        self.next = Some(name.into());
        self
    }

    fn documents(context: &Context) -> Vec<ScoredChunk> {
        if !context.contains_key(DOCUMENTS) {
            return Vec::new();
        }
        context.get_as(DOCUMENTS).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring malformed documents");
            Vec::new()
        })
    }
}

impl Node for GenerateNode {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin(async move {
            let question = context
                .get_str(QUESTION)
                .ok_or_else(|| NodeflowError::node("generate", "context has no question"))?;
            let documents = Self::documents(&context);

            let request = GenerationRequest::new(build_answer_prompt(question, &documents))
                .with_system(self.system_prompt.clone());
            let answer = self.generator.generate(&self.model, request).await?;
            debug!(documents = documents.len(), chars = answer.len(), "Generated answer");

            let mut output = NodeOutput::patch(Patch::set(ANSWER, serde_json::Value::String(answer)));
            if let Some(next) = self.next.as_ref().filter(|n| transitions.contains(*n)) {
                output.transition = Some(next.clone());
            }
            Ok(Some(output))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_test_utils::MockGenerator;
    use serde_json::json;

    #[tokio::test]
    async fn test_answer_uses_documents() {
        let generator = Arc::new(MockGenerator::new("Tokio."));
        let node = GenerateNode::new(generator.clone(), ModelConfig::default());

        let ctx = Context::new()
            .apply(Patch::set(QUESTION, json!("Which runtime?")))
            .apply(Patch::set(
                DOCUMENTS,
                json!([{"source": "a.md", "chunk_index": 0, "content": "We use tokio.", "score": 0.8}]),
            ));

        let out = node.next(ctx.clone(), Transitions::new()).await.unwrap().unwrap();
        assert!(out.transition.is_none());
        assert_eq!(ctx.apply(out.patch.unwrap()).get_str(ANSWER), Some("Tokio."));

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("We use tokio."));
        assert_eq!(requests[0].system.as_deref(), Some(DEFAULT_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_answer_without_documents() {
        let generator = Arc::new(MockGenerator::new("Hello!"));
        let node = GenerateNode::new(generator.clone(), ModelConfig::default())
            .with_system_prompt("Be brief.");

        let ctx = Context::new().apply(Patch::set(QUESTION, json!("Hi?")));
        let out = node.next(ctx, Transitions::new()).await.unwrap().unwrap();
        assert!(out.patch.is_some());
        assert_eq!(generator.requests()[0].prompt, "Question: Hi?");
        assert_eq!(generator.requests()[0].system.as_deref(), Some("Be brief."));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let node = GenerateNode::new(
            Arc::new(MockGenerator::failing("model offline")),
            ModelConfig::default(),
        );
        let ctx = Context::new().apply(Patch::set(QUESTION, json!("q")));
        let err = node.next(ctx, Transitions::new()).await.unwrap_err();
        assert!(matches!(err, NodeflowError::Generation(m) if m == "model offline"));
    }

    #[tokio::test]
    async fn test_continues_to_wired_successor() {
        let node = GenerateNode::new(Arc::new(MockGenerator::new("ok")), ModelConfig::default())
            .then("review");
        let ctx = Context::new().apply(Patch::set(QUESTION, json!("q")));
        let wired: Transitions = ["review".to_string()].into_iter().collect();
        let out = node.next(ctx, wired).await.unwrap().unwrap();
        assert_eq!(out.transition.as_deref(), Some("review"));
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use nodeflow_core::config::ModelConfig;
use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{Node, NodeOutput, TextGenerator, Transitions};
use nodeflow_core::types::GenerationRequest;

use crate::prompt::build_route_prompt;
use crate::{QUESTION, ROUTE};

const DEFAULT_INSTRUCTIONS: &str = "Decide how to handle the question. \
Choose \"retrieve\" if answering needs the document collection, \
or \"generate\" if it can be answered directly.";

/// Lets the model choose one of the wired transitions.
///
/// The choice is also recorded under `route`. An unusable reply, or a
/// generator error, falls back to the configured fallback when it is wired;
/// otherwise the run stops here.
pub struct RouteNode {
    generator: Arc<dyn TextGenerator>,
    model: ModelConfig,
    instructions: String,
    fallback: Option<String>,
}

impl RouteNode {
    pub fn new(generator: Arc<dyn TextGenerator>, model: ModelConfig) -> Self {
        Self {
            generator,
            model,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            fallback: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    fn fallback_for(&self, transitions: &Transitions) -> Option<String> {
        self.fallback
            .as_ref()
            .filter(|f| transitions.contains(*f))
            .cloned()
    }
}

/// Match a model reply against the offered transitions.
///
/// An exact (case-insensitive) reply wins; otherwise the longest transition
/// name mentioned in the reply is taken.
pub fn parse_choice(reply: &str, transitions: &Transitions) -> Option<String> {
    let reply = reply.trim().trim_matches(|c: char| c == '"' || c == '.').to_lowercase();

    if let Some(exact) = transitions.iter().find(|t| t.to_lowercase() == reply) {
        return Some(exact.clone());
    }

    transitions
        .iter()
        .filter(|t| reply.contains(&t.to_lowercase()))
        .max_by_key(|t| t.len())
        .cloned()
}

impl Node for RouteNode {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin(async move {
            if transitions.is_empty() {
                return Ok(None);
            }
            let question = context
                .get_str(QUESTION)
                .ok_or_else(|| NodeflowError::node("route", "context has no question"))?;

            let prompt = build_route_prompt(&self.instructions, question, &transitions);
            let choice = match self
                .generator
                .generate(&self.model, GenerationRequest::new(prompt))
                .await
            {
                Ok(reply) => parse_choice(&reply, &transitions).or_else(|| {
                    debug!(reply = %reply, "Router reply matched no transition");
                    self.fallback_for(&transitions)
                }),
                Err(e) => {
                    warn!(error = %e, "Router generation failed, using fallback");
                    self.fallback_for(&transitions)
                }
            };

            let Some(choice) = choice else {
                return Ok(None);
            };
            debug!(route = %choice, "Routed question");
            Ok(Some(
                NodeOutput::patch(Patch::set(ROUTE, serde_json::Value::String(choice.clone())))
                    .with_transition(choice),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_test_utils::MockGenerator;
    use serde_json::json;

    fn wired(names: &[&str]) -> Transitions {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn question() -> Context {
        Context::new().apply(Patch::set(QUESTION, json!("What does the manual say?")))
    }

    #[test]
    fn test_parse_choice() {
        let t = wired(&["generate", "retrieve"]);
        assert_eq!(parse_choice("retrieve", &t).as_deref(), Some("retrieve"));
        assert_eq!(parse_choice("  \"Generate\".", &t).as_deref(), Some("generate"));
        assert_eq!(
            parse_choice("I would retrieve first.", &t).as_deref(),
            Some("retrieve")
        );
        assert_eq!(parse_choice("no idea", &t), None);
    }

    #[test]
    fn test_parse_choice_prefers_longest_mention() {
        let t = wired(&["search", "search_web"]);
        assert_eq!(
            parse_choice("use search_web", &t).as_deref(),
            Some("search_web")
        );
    }

    #[tokio::test]
    async fn test_routes_on_model_reply() {
        let generator = Arc::new(MockGenerator::new("retrieve"));
        let node = RouteNode::new(generator.clone(), ModelConfig::default());

        let out = node
            .next(question(), wired(&["generate", "retrieve"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.transition.as_deref(), Some("retrieve"));
        assert_eq!(
            question().apply(out.patch.unwrap()).get_str(ROUTE),
            Some("retrieve")
        );
        assert!(generator.requests()[0]
            .prompt
            .contains("Options: generate, retrieve"));
    }

    #[tokio::test]
    async fn test_unmatched_reply_uses_fallback() {
        let node = RouteNode::new(Arc::new(MockGenerator::new("hmm")), ModelConfig::default())
            .with_fallback("retrieve");
        let out = node
            .next(question(), wired(&["generate", "retrieve"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.transition.as_deref(), Some("retrieve"));
    }

    #[tokio::test]
    async fn test_generator_error_without_fallback_stops() {
        let node = RouteNode::new(
            Arc::new(MockGenerator::failing("offline")),
            ModelConfig::default(),
        );
        let out = node
            .next(question(), wired(&["generate", "retrieve"]))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_no_transitions_skips_model() {
        let generator = Arc::new(MockGenerator::new("retrieve"));
        let node = RouteNode::new(generator.clone(), ModelConfig::default());
        assert!(node.next(question(), Transitions::new()).await.unwrap().is_none());
        assert!(generator.requests().is_empty());
    }
}

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use nodeflow_core::config::{AppConfig, GraphConfig, ModelConfig};
use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::Result;
use nodeflow_core::event::EventBus;
use nodeflow_core::traits::TextGenerator;
use nodeflow_graph::Graph;
use nodeflow_memory::chunker::ChunkOptions;
use nodeflow_memory::embeddings::EmbeddingProvider;
use nodeflow_memory::ingest::ingest_text;
use nodeflow_memory::store::{ScoredChunk, VectorStore};

use crate::{
    GenerateNode, RetrieveNode, RouteNode, ANSWER, DOCUMENTS, GENERATE_NODE, QUESTION,
    RETRIEVE_NODE, ROUTE, ROUTE_NODE,
};

/// Result of one `ask` run.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: Option<String>,
    pub documents: Vec<ScoredChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Set when the run ended on a contained failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub context: Context,
}

impl Answer {
    fn from_run(context: Context, error: Option<String>) -> Self {
        Self {
            answer: context.get_str(ANSWER).map(String::from),
            documents: context.get_as(DOCUMENTS).unwrap_or_default(),
            route: context.get_str(ROUTE).map(String::from),
            error,
            context,
        }
    }
}

/// Shared collaborators for the question-answering graph.
///
/// The pipeline itself is stateless between calls: each `ask` builds a fresh
/// `Graph`, so concurrent requests never share a context.
pub struct RagPipeline {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    model: ModelConfig,
    chunking: ChunkOptions,
    top_k: usize,
    router: bool,
    graph_config: GraphConfig,
    events: Option<Arc<EventBus>>,
}

impl RagPipeline {
    pub fn new(
        config: &AppConfig,
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            embedder,
            generator,
            model: config.model.clone(),
            chunking: ChunkOptions::from_config(&config.chunking)?,
            top_k: config.retrieval.top_k,
            router: config.retrieval.router,
            graph_config: config.graph.clone(),
            events: None,
        })
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Assemble `[route ->] retrieve -> generate`.
    pub fn graph(&self) -> Result<Graph> {
        let mut graph = Graph::new("rag").with_config(&self.graph_config);
        if let Some(bus) = &self.events {
            graph = graph.with_event_bus(bus.clone());
        }

        graph = graph
            .node(
                RETRIEVE_NODE,
                RetrieveNode::new(self.store.clone(), self.embedder.clone(), self.top_k)
                    .then(GENERATE_NODE),
            )
            .node(
                GENERATE_NODE,
                GenerateNode::new(self.generator.clone(), self.model.clone()),
            )
            .edge(RETRIEVE_NODE, GENERATE_NODE);

        if !self.router {
            return graph.set_start(RETRIEVE_NODE);
        }

        graph
            .node(
                ROUTE_NODE,
                RouteNode::new(self.generator.clone(), self.model.clone())
                    .with_fallback(RETRIEVE_NODE),
            )
            .edges([(ROUTE_NODE, RETRIEVE_NODE), (ROUTE_NODE, GENERATE_NODE)])
            .set_start(ROUTE_NODE)
    }

    /// Run the graph once for `question`.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let mut graph = self.graph()?;
        let context = graph
            .run(Some(Patch::set(
                QUESTION,
                serde_json::Value::String(question.to_string()),
            )))
            .await;

        let error = graph.last_error().map(|e| e.to_string());
        info!(
            state = ?graph.state(),
            failed = error.is_some(),
            "Answered question"
        );
        Ok(Answer::from_run(context, error))
    }

    /// Chunk, embed and store `text` under `source`.
    pub async fn ingest(&self, source: &str, text: &str) -> Result<usize> {
        ingest_text(&self.store, self.embedder.as_ref(), source, text, &self.chunking).await
    }
}

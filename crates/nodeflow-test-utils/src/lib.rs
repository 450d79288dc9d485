//! Mocks and fixtures shared by nodeflow's tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::traits::{Node, NodeOutput, TextGenerator, Transitions};
use nodeflow_core::types::GenerationRequest;
use nodeflow_memory::embeddings::EmbeddingProvider;
use nodeflow_memory::store::VectorStore;

/// What a [`ScriptedNode`] saw on one invocation.
#[derive(Debug, Clone)]
pub struct NodeCall {
    pub context: Context,
    pub transitions: Transitions,
}

enum Scripted {
    Output(NodeOutput),
    Stop,
    Fail(String),
    Panic(String),
}

#[derive(Default)]
struct ScriptedInner {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<NodeCall>>,
}

/// Node that replays a fixed script and records every call.
///
/// Clones share the script and call log, so a test can register one clone in
/// a graph and inspect the other. Once the script runs out the node stops.
#[derive(Clone, Default)]
pub struct ScriptedNode {
    inner: Arc<ScriptedInner>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: Scripted) -> Self {
        self.inner.script.lock().unwrap().push_back(step);
        self
    }

    /// Return `output` on the next unanswered call.
    pub fn then(self, output: NodeOutput) -> Self {
        self.push(Scripted::Output(output))
    }

    /// Patch with a JSON object and optionally route.
    pub fn then_patch(self, patch: serde_json::Value, transition: Option<&str>) -> Self {
        let patch = Patch::from_value(patch).expect("scripted patch must be a JSON object");
        let mut output = NodeOutput::patch(patch);
        output.transition = transition.map(String::from);
        self.then(output)
    }

    pub fn then_goto(self, name: &str) -> Self {
        self.then(NodeOutput::goto(name))
    }

    /// Return `Ok(None)`.
    pub fn then_stop(self) -> Self {
        self.push(Scripted::Stop)
    }

    /// Return a `NodeExecution` error.
    pub fn then_fail(self, message: &str) -> Self {
        self.push(Scripted::Fail(message.to_string()))
    }

    /// Panic inside the node future.
    pub fn then_panic(self, message: &str) -> Self {
        self.push(Scripted::Panic(message.to_string()))
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        self.inner.calls.lock().unwrap().clone()
    }
}

impl Node for ScriptedNode {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin(async move {
            self.inner.calls.lock().unwrap().push(NodeCall {
                context,
                transitions,
            });
            let step = self.inner.script.lock().unwrap().pop_front();
            match step {
                Some(Scripted::Output(output)) => Ok(Some(output)),
                Some(Scripted::Stop) | None => Ok(None),
                Some(Scripted::Fail(message)) => Err(NodeflowError::node("scripted", message)),
                Some(Scripted::Panic(message)) => panic!("{}", message),
            }
        })
    }
}

/// Text generator returning canned completions.
pub struct MockGenerator {
    responses: Mutex<VecDeque<String>>,
    default_response: String,
    fail_with: Option<String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    /// Always answer `response`.
    pub fn new(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: response.to_string(),
            fail_with: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `responses` in order, then fall back to the default.
    pub fn with_responses(self, responses: &[&str]) -> Self {
        self.responses
            .lock()
            .unwrap()
            .extend(responses.iter().map(|s| s.to_string()));
        self
    }

    /// Fail every request.
    pub fn failing(message: &str) -> Self {
        let mut generator = Self::new("");
        generator.fail_with = Some(message.to_string());
        generator
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TextGenerator for MockGenerator {
    fn generate(
        &self,
        _config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            if let Some(message) = &self.fail_with {
                return Err(NodeflowError::Generation(message.clone()));
            }
            let next = self.responses.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| self.default_response.clone()))
        })
    }
}

/// Deterministic embedder: letter-frequency vectors folded into `dims` buckets.
///
/// Texts sharing vocabulary end up close under cosine similarity, which is
/// enough for retrieval tests.
pub struct MockEmbedder {
    dims: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            dims: 8,
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let bucket = word
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % self.dims] += 1.0;
        }
        v
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NodeflowError::Embedding("mock embedder failure".into()));
            }
            Ok(texts.iter().map(|t| self.vector(t)).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Fresh in-memory vector store.
pub fn memory_store() -> Arc<VectorStore> {
    Arc::new(VectorStore::in_memory().expect("in-memory vector store"))
}

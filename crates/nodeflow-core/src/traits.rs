use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::context::{Context, Patch};
use crate::error::Result;
use crate::types::GenerationRequest;

/// Destination names wired from the active node.
pub type Transitions = BTreeSet<String>;

/// What a node asks the engine to do after it ran.
///
/// An empty output (no patch, no transition) is a normal stop, same as
/// returning `Ok(None)`.
#[derive(Debug, Default)]
pub struct NodeOutput {
    /// Merged into the context before the transition is validated.
    pub patch: Option<Patch>,
    /// Name of the node to run next. Must be one of the offered transitions.
    pub transition: Option<String>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output that only patches the context and then stops.
    pub fn patch(patch: Patch) -> Self {
        Self {
            patch: Some(patch),
            transition: None,
        }
    }

    /// Output that only routes to `name`.
    pub fn goto(name: impl Into<String>) -> Self {
        Self {
            patch: None,
            transition: Some(name.into()),
        }
    }

    pub fn with_patch(mut self, patch: Patch) -> Self {
        self.patch = Some(patch);
        self
    }

    pub fn with_transition(mut self, name: impl Into<String>) -> Self {
        self.transition = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.patch.is_none() && self.transition.is_none()
    }
}

/// A single pipeline step driven by the graph engine.
///
/// The engine hands every invocation the current context snapshot and the set
/// of names it may transition to, and awaits the returned future before doing
/// anything else. Any state a node keeps is its own business.
pub trait Node: Send + Sync + 'static {
    /// Inspect the context and decide what happens next.
    ///
    /// - `Ok(None)` stops the run normally.
    /// - `Ok(Some(output))` may patch the context and/or name a transition.
    /// - `Err(_)` stops the run; the engine logs it and does not re-raise.
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>>;
}

impl<N: Node + ?Sized> Node for Arc<N> {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        (**self).next(context, transitions)
    }
}

impl<N: Node + ?Sized> Node for Box<N> {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        (**self).next(context, transitions)
    }
}

/// Adapts an async closure into a [`Node`].
///
/// ```ignore
/// let node = FnNode::new(|ctx, _transitions| async move {
///     Ok(Some(NodeOutput::patch(Patch::set("seen", json!(ctx.len())))))
/// });
/// ```
pub struct FnNode<F> {
    f: F,
}

impl<F, Fut> FnNode<F>
where
    F: Fn(Context, Transitions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<NodeOutput>>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Node for FnNode<F>
where
    F: Fn(Context, Transitions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<NodeOutput>>> + Send + 'static,
{
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin((self.f)(context, transitions))
    }
}

/// Text generation client: one prompt in, one completion out.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        config: &ModelConfig,
        request: GenerationRequest,
    ) -> BoxFuture<'_, Result<String>>;
}

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use nodeflow_core::config::GraphConfig;
use nodeflow_core::context::{Context, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::{EventBus, GraphEvent, Outcome};
use nodeflow_core::traits::{Node, NodeOutput, Transitions};
use nodeflow_core::types::{RunId, RunState};

use super::table::{EdgeDef, TransitionTable};

/// Drives named nodes over a shared context.
///
/// Build it by registering nodes and edges and designating a start node, then
/// call `run` (or `step` repeatedly). One graph holds one context and one
/// current pointer; run separate instances for parallel pipelines.
pub struct Graph {
    name: String,
    nodes: HashMap<String, Box<dyn Node>>,
    table: TransitionTable,
    current: Option<String>,
    context: Context,
    state: RunState,
    last_error: Option<NodeflowError>,
    max_steps: Option<usize>,
    events: Option<Arc<EventBus>>,
}

impl Graph {
    /// Create an empty graph with an empty context.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            table: TransitionTable::new(),
            current: None,
            context: Context::new(),
            state: RunState::Unstarted,
            last_error: None,
            max_steps: None,
            events: None,
        }
    }

    /// Publish engine events on `bus` in addition to tracing output.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Cap the number of steps a single `run` may take. The limit is checked
    /// before each step, so `Some(0)` fails without invoking any node.
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Apply engine settings from config.
    pub fn with_config(self, config: &GraphConfig) -> Self {
        self.with_max_steps(config.max_steps)
    }

    // --- Builder -----------------------------------------------------------

    /// Register `node` under `name`. A later registration for the same name wins.
    pub fn register_node(&mut self, name: impl Into<String>, node: impl Node) {
        let name = name.into();
        if self.nodes.insert(name.clone(), Box::new(node)).is_some() {
            debug!(graph = %self.name, node = %name, "Replaced node registration");
        }
    }

    /// Allow a transition from `from` to `to`. Idempotent.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.table.add(from, to);
    }

    /// Register several edges at once.
    pub fn wire<I, E>(&mut self, edges: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<EdgeDef>,
    {
        for edge in edges {
            let edge = edge.into();
            self.table.add(edge.from, edge.to);
        }
    }

    /// Designate the start node. Fails if `name` is not registered.
    pub fn start_at(&mut self, name: &str) -> Result<()> {
        if !self.nodes.contains_key(name) {
            return Err(NodeflowError::UnknownStartNode(name.to_string()));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Chainable form of [`Graph::register_node`].
    pub fn node(mut self, name: impl Into<String>, node: impl Node) -> Self {
        self.register_node(name, node);
        self
    }

    /// Chainable form of [`Graph::add_edge`].
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.add_edge(from, to);
        self
    }

    /// Chainable form of [`Graph::wire`].
    pub fn edges<I, E>(mut self, edges: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<EdgeDef>,
    {
        self.wire(edges);
        self
    }

    /// Chainable form of [`Graph::start_at`].
    pub fn set_start(mut self, name: &str) -> Result<Self> {
        self.start_at(name)?;
        Ok(self)
    }

    // --- Accessors ---------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current context snapshot.
    pub fn context(&self) -> Context {
        self.context.clone()
    }

    /// Name of the active node, `None` until a start node is set.
    pub fn current_node(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Transitions wired from the active node.
    pub fn available_transitions(&self) -> Transitions {
        self.current
            .as_deref()
            .map(|name| self.table.outgoing(name))
            .unwrap_or_default()
    }

    /// Transitions wired from any node.
    pub fn transitions_from(&self, name: &str) -> Transitions {
        self.table.outgoing(name)
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Why the last step stopped, if it stopped on a contained error.
    pub fn last_error(&self) -> Option<&NodeflowError> {
        self.last_error.as_ref()
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registered node names, sorted.
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    // --- Execution ---------------------------------------------------------

    /// Run from the current node until a step reports "not continuing".
    ///
    /// Always returns the latest context; failures are only visible through
    /// logs, the event bus and [`Graph::last_error`].
    pub async fn run(&mut self, patch: Option<Patch>) -> Context {
        let run_id = RunId::new();
        let started = Instant::now();

        info!(graph = %self.name, run_id = %run_id, node = ?self.current, "Graph run started");
        self.publish(GraphEvent::RunStarted {
            graph: self.name.clone(),
            run_id: run_id.clone(),
            node: self.current.clone(),
        });

        let mut steps = 0usize;
        let seeded = match patch {
            Some(patch) => match self.merge(patch) {
                Ok(()) => true,
                Err(message) => {
                    self.fail(NodeflowError::PatchPanicked(message));
                    false
                }
            },
            None => true,
        };

        if seeded {
            loop {
                if let Some(limit) = self.max_steps {
                    if steps >= limit {
                        self.fail(NodeflowError::StepLimitExceeded(limit));
                        break;
                    }
                }
                let continuing = self.step(None).await;
                steps += 1;
                if !continuing {
                    break;
                }
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            graph = %self.name,
            run_id = %run_id,
            steps,
            elapsed_ms,
            state = ?self.state,
            "Graph run finished"
        );
        self.publish(GraphEvent::RunFinished {
            graph: self.name.clone(),
            run_id,
            steps,
            elapsed_ms,
        });

        self.context.clone()
    }

    /// Merge `patch`, invoke the current node once and follow its transition.
    ///
    /// Returns `true` when the pointer moved to another node and `false` on
    /// any terminal condition, normal or not. Never returns an error.
    pub async fn step(&mut self, patch: Option<Patch>) -> bool {
        self.last_error = None;

        if let Some(patch) = patch {
            if let Err(message) = self.merge(patch) {
                return self.fail(NodeflowError::PatchPanicked(message));
            }
        }

        match self.advance().await {
            Ok(true) => {
                self.state = RunState::Running;
                true
            }
            Ok(false) => {
                self.complete();
                false
            }
            Err(e) => self.fail(e),
        }
    }

    /// One node invocation. `Ok(true)` means the pointer advanced.
    async fn advance(&mut self) -> Result<bool> {
        let current = self.current.clone().ok_or(NodeflowError::NotStarted)?;
        let transitions = self.table.outgoing(&current);
        let node = self
            .nodes
            .get(&current)
            .ok_or_else(|| NodeflowError::UnknownNode(current.clone()))?;

        debug!(graph = %self.name, node = %current, ?transitions, "Invoking node");
        self.publish(GraphEvent::NodeStarted {
            graph: self.name.clone(),
            node: current.clone(),
            transitions: transitions.iter().cloned().collect(),
        });

        let node_start = Instant::now();
        // `next` runs inside the guard so panics raised before the node
        // builds its future are caught too.
        let snapshot = self.context.clone();
        let offered = transitions.clone();
        let result = AssertUnwindSafe(async move { node.next(snapshot, offered).await })
            .catch_unwind()
            .await;
        let elapsed_ms = node_start.elapsed().as_millis() as u64;

        let output = match result {
            Ok(Ok(Some(output))) => output,
            Ok(Ok(None)) => NodeOutput::new(),
            Ok(Err(e)) => return Err(e),
            Err(payload) => {
                return Err(NodeflowError::NodePanicked {
                    node: current,
                    message: panic_message(payload),
                })
            }
        };

        let NodeOutput { patch, transition } = output;
        let patched = patch.is_some();
        if let Some(patch) = patch {
            self.merge(patch)
                .map_err(|message| NodeflowError::NodePanicked {
                    node: current.clone(),
                    message,
                })?;
        }

        debug!(
            graph = %self.name,
            node = %current,
            patched,
            transition = ?transition,
            elapsed_ms,
            "Node returned"
        );
        self.publish(GraphEvent::NodeCompleted {
            graph: self.name.clone(),
            node: current.clone(),
            patched,
            transition: transition.clone(),
            elapsed_ms,
        });

        let Some(target) = transition else {
            return Ok(false);
        };

        if !transitions.contains(&target) {
            return Err(NodeflowError::InvalidTransition {
                from: current,
                to: target,
                available: transitions.into_iter().collect(),
            });
        }
        if !self.nodes.contains_key(&target) {
            return Err(NodeflowError::UnknownNode(target));
        }

        debug!(graph = %self.name, from = %current, to = %target, "Transition");
        self.publish(GraphEvent::Transitioned {
            graph: self.name.clone(),
            from: current,
            to: target.clone(),
        });
        self.current = Some(target);
        Ok(true)
    }

    /// Replace the context with `patch` merged in. Err carries a panic message.
    fn merge(&mut self, patch: Patch) -> std::result::Result<(), String> {
        let context = &self.context;
        let merged = std::panic::catch_unwind(AssertUnwindSafe(|| context.apply(patch)))
            .map_err(panic_message)?;
        self.context = merged;
        Ok(())
    }

    fn complete(&mut self) {
        debug!(graph = %self.name, node = ?self.current, "Graph reached terminal node");
        self.state = RunState::Completed;
        self.publish(GraphEvent::Terminated {
            graph: self.name.clone(),
            node: self.current.clone(),
            outcome: Outcome::Completed,
        });
    }

    fn fail(&mut self, e: NodeflowError) -> bool {
        match &e {
            NodeflowError::NotStarted => {
                warn!(graph = %self.name, "Graph stepped before a start node was set")
            }
            _ => error!(graph = %self.name, node = ?self.current, error = %e, "Graph run terminated"),
        }
        self.state = RunState::Failed;
        self.publish(GraphEvent::Terminated {
            graph: self.name.clone(),
            node: self.current.clone(),
            outcome: Outcome::Failed {
                error: e.to_string(),
            },
        });
        self.last_error = Some(e);
        false
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

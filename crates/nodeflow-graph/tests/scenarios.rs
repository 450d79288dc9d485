use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use nodeflow_core::context::{Context, ContextMap, Patch};
use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::event::{EventBus, GraphEvent, Outcome};
use nodeflow_core::traits::{Node, NodeOutput, Transitions};
use nodeflow_core::types::RunState;
use nodeflow_graph::{BranchNode, Graph};
use nodeflow_test_utils::ScriptedNode;

#[tokio::test]
async fn patch_then_transition_accumulates_context() {
    let a = ScriptedNode::new().then_patch(json!({"x": 1}), Some("B"));
    let b = ScriptedNode::new().then_patch(json!({"y": 2}), None);

    let mut graph = Graph::new("scenario-1")
        .node("A", a.clone())
        .node("B", b.clone())
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    let ctx = graph.run(Some(Patch::empty())).await;

    assert_eq!(ctx.to_value(), json!({"x": 1, "y": 2}));
    assert_eq!(graph.state(), RunState::Completed);
    assert_eq!(graph.current_node(), Some("B"));
    assert!(graph.last_error().is_none());

    // B sees A's patch
    assert_eq!(b.calls()[0].context.get("x"), Some(&json!(1)));
}

#[tokio::test]
async fn unwired_transition_stops_with_own_patch() {
    let a = ScriptedNode::new().then_patch(json!({"x": 1}), Some("Z"));
    let b = ScriptedNode::new();

    let mut graph = Graph::new("scenario-2")
        .node("A", a)
        .node("B", b.clone())
        .node("Z", ScriptedNode::new())
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    let ctx = graph.run(None).await;

    assert_eq!(ctx.to_value(), json!({"x": 1}));
    assert_eq!(graph.current_node(), Some("A"));
    assert_eq!(graph.state(), RunState::Failed);
    assert_eq!(b.call_count(), 0);
    match graph.last_error() {
        Some(NodeflowError::InvalidTransition { from, to, available }) => {
            assert_eq!(from, "A");
            assert_eq!(to, "Z");
            assert_eq!(available, &vec!["B".to_string()]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn failing_node_keeps_prior_context() {
    let a = ScriptedNode::new().then_fail("downstream unavailable");

    let mut graph = Graph::new("scenario-3")
        .node("A", a)
        .node("B", ScriptedNode::new())
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    let ctx = graph.run(Some(Patch::set("seed", json!("s")))).await;

    assert_eq!(ctx.to_value(), json!({"seed": "s"}));
    assert_eq!(graph.current_node(), Some("A"));
    assert_eq!(graph.state(), RunState::Failed);
    assert!(matches!(
        graph.last_error(),
        Some(NodeflowError::NodeExecution { .. })
    ));
}

#[tokio::test]
async fn panicking_node_is_contained() {
    let a = ScriptedNode::new().then_panic("kaboom");

    let mut graph = Graph::new("panic").node("A", a).set_start("A").unwrap();
    let ctx = graph.run(Some(Patch::set("seed", json!(true)))).await;

    assert_eq!(ctx.get("seed"), Some(&json!(true)));
    match graph.last_error() {
        Some(NodeflowError::NodePanicked { node, message }) => {
            assert_eq!(node, "A");
            assert_eq!(message, "kaboom");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

/// Reads its input eagerly, before building the future.
struct EagerNode;

impl Node for EagerNode {
    fn next(
        &self,
        context: Context,
        _transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        let question = context.get_str("question").unwrap().to_string();
        Box::pin(async move { Ok(Some(NodeOutput::patch(Patch::set("echo", json!(question))))) })
    }
}

#[tokio::test]
async fn panic_before_future_is_built_is_contained() {
    let mut graph = Graph::new("eager")
        .node("A", EagerNode)
        .set_start("A")
        .unwrap();

    let ctx = graph.run(Some(Patch::set("seed", json!(1)))).await;

    assert_eq!(ctx.to_value(), json!({"seed": 1}));
    assert_eq!(graph.state(), RunState::Failed);
    assert_eq!(graph.current_node(), Some("A"));
    assert!(matches!(
        graph.last_error(),
        Some(NodeflowError::NodePanicked { node, .. }) if node == "A"
    ));

    // The same node succeeds once its input is present
    assert!(!graph.step(Some(Patch::set("question", json!("q")))).await);
    assert_eq!(graph.context().get_str("echo"), Some("q"));
    assert_eq!(graph.state(), RunState::Completed);
}

#[tokio::test]
async fn stop_without_transition_skips_wired_successor() {
    let a = ScriptedNode::new().then_goto("B");
    let b = ScriptedNode::new().then_patch(json!({"b": "done"}), None);
    let c = ScriptedNode::new();

    let mut graph = Graph::new("scenario-4")
        .node("A", a)
        .node("B", b.clone())
        .node("C", c.clone())
        .edge("A", "B")
        .edge("B", "C")
        .set_start("A")
        .unwrap();

    let ctx = graph.run(None).await;

    assert_eq!(ctx.get_str("b"), Some("done"));
    assert_eq!(b.call_count(), 1);
    assert_eq!(c.call_count(), 0);
    assert_eq!(graph.current_node(), Some("B"));
    assert_eq!(graph.state(), RunState::Completed);
}

#[tokio::test]
async fn available_transitions_collapse_duplicates() {
    let a = ScriptedNode::new();
    let graph = Graph::new("scenario-5")
        .node("A", a.clone())
        .node("B", ScriptedNode::new())
        .node("C", ScriptedNode::new())
        .edge("A", "B")
        .edge("A", "B")
        .edge("A", "C")
        .set_start("A")
        .unwrap();

    let names: Vec<String> = graph.available_transitions().into_iter().collect();
    assert_eq!(names, vec!["B", "C"]);
}

#[tokio::test]
async fn node_receives_wired_transitions() {
    let a = ScriptedNode::new().then_goto("C");
    let c = ScriptedNode::new();

    let mut graph = Graph::new("offered")
        .node("A", a.clone())
        .node("B", ScriptedNode::new())
        .node("C", c.clone())
        .edges([("A", "B"), ("A", "C")])
        .set_start("A")
        .unwrap();

    graph.run(None).await;

    let offered: Vec<String> = a.calls()[0].transitions.iter().cloned().collect();
    assert_eq!(offered, vec!["B", "C"]);
    assert_eq!(c.call_count(), 1);
    // C has no outgoing edges
    assert!(c.calls()[0].transitions.is_empty());
}

#[tokio::test]
async fn wired_but_unregistered_target_is_contained() {
    let a = ScriptedNode::new().then_patch(json!({"x": 1}), Some("ghost"));

    let mut graph = Graph::new("ghost")
        .node("A", a)
        .edge("A", "ghost")
        .set_start("A")
        .unwrap();

    let ctx = graph.run(None).await;

    assert_eq!(ctx.to_value(), json!({"x": 1}));
    assert_eq!(graph.current_node(), Some("A"));
    assert!(matches!(
        graph.last_error(),
        Some(NodeflowError::UnknownNode(name)) if name == "ghost"
    ));
}

#[tokio::test]
async fn step_by_step_with_external_patch() {
    let a = ScriptedNode::new().then_goto("B");
    let b = ScriptedNode::new().then_patch(json!({"b": 1}), None);

    let mut graph = Graph::new("manual")
        .node("A", a)
        .node("B", b.clone())
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    assert_eq!(graph.state(), RunState::Unstarted);
    assert!(graph.step(Some(Patch::set("seed", json!(0)))).await);
    assert_eq!(graph.state(), RunState::Running);
    assert_eq!(graph.current_node(), Some("B"));

    // Manual patch between steps is visible to the next node
    assert!(!graph.step(Some(Patch::set("operator", json!("ok")))).await);
    assert_eq!(b.calls()[0].context.get_str("operator"), Some("ok"));
    assert_eq!(graph.state(), RunState::Completed);

    let ctx = graph.context();
    assert_eq!(ctx.get("seed"), Some(&json!(0)));
    assert_eq!(ctx.get("b"), Some(&json!(1)));
}

#[tokio::test]
async fn computed_patch_reads_snapshot_before_merge() {
    let a = ScriptedNode::new().then(NodeOutput::patch(Patch::computed(|ctx| {
        let n = ctx.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
        let mut m = ContextMap::new();
        m.insert("n".into(), json!(n * 10));
        m
    })));

    let mut graph = Graph::new("computed").node("A", a).set_start("A").unwrap();
    let ctx = graph.run(Some(Patch::set("n", json!(4)))).await;

    assert_eq!(ctx.get("n"), Some(&json!(40)));
}

#[tokio::test]
async fn later_registration_wins() {
    let first = ScriptedNode::new().then_patch(json!({"who": "first"}), None);
    let second = ScriptedNode::new().then_patch(json!({"who": "second"}), None);

    let mut graph = Graph::new("overwrite")
        .node("A", first.clone())
        .node("A", second)
        .set_start("A")
        .unwrap();

    let ctx = graph.run(None).await;
    assert_eq!(ctx.get_str("who"), Some("second"));
    assert_eq!(first.call_count(), 0);
}

#[tokio::test]
async fn step_limit_halts_cycles() {
    // A and B bounce forever
    let a = ScriptedNode::new().then_goto("B").then_goto("B").then_goto("B");
    let b = ScriptedNode::new().then_goto("A").then_goto("A").then_goto("A");

    let mut graph = Graph::new("loop")
        .node("A", a.clone())
        .node("B", b.clone())
        .edges([("A", "B"), ("B", "A")])
        .with_max_steps(Some(3))
        .set_start("A")
        .unwrap();

    graph.run(None).await;

    assert_eq!(a.call_count() + b.call_count(), 3);
    assert_eq!(graph.state(), RunState::Failed);
    assert!(matches!(
        graph.last_error(),
        Some(NodeflowError::StepLimitExceeded(3))
    ));
}

#[tokio::test]
async fn zero_step_limit_invokes_nothing() {
    let a = ScriptedNode::new().then_patch(json!({"ran": true}), None);

    let mut graph = Graph::new("no-steps")
        .node("A", a.clone())
        .with_max_steps(Some(0))
        .set_start("A")
        .unwrap();

    let ctx = graph.run(Some(Patch::set("seed", json!(1)))).await;

    assert_eq!(a.call_count(), 0);
    assert_eq!(ctx.to_value(), json!({"seed": 1}));
    assert!(matches!(
        graph.last_error(),
        Some(NodeflowError::StepLimitExceeded(0))
    ));
}

#[tokio::test]
async fn run_ending_exactly_at_step_limit_completes() {
    let a = ScriptedNode::new().then_goto("B");
    let b = ScriptedNode::new().then_patch(json!({"b": 1}), None);

    let mut graph = Graph::new("exact")
        .node("A", a)
        .node("B", b)
        .edge("A", "B")
        .with_max_steps(Some(2))
        .set_start("A")
        .unwrap();

    graph.run(None).await;

    assert_eq!(graph.state(), RunState::Completed);
    assert!(graph.last_error().is_none());
}

#[tokio::test]
async fn branch_node_routes_on_context() {
    let retrieve = ScriptedNode::new().then_patch(json!({"path": "retrieve"}), None);
    let chat = ScriptedNode::new().then_patch(json!({"path": "chat"}), None);

    let mut graph = Graph::new("branch")
        .node(
            "classify",
            BranchNode::new()
                .when(r#"kind == "question""#, "retrieve")
                .otherwise("chat"),
        )
        .node("retrieve", retrieve)
        .node("chat", chat)
        .edges([("classify", "retrieve"), ("classify", "chat")])
        .set_start("classify")
        .unwrap();

    let ctx = graph.run(Some(Patch::set("kind", json!("smalltalk")))).await;
    assert_eq!(ctx.get_str("path"), Some("chat"));
}

#[tokio::test]
async fn events_are_published() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();

    let mut graph = Graph::new("events")
        .with_event_bus(bus.clone())
        .node("A", ScriptedNode::new().then_goto("B"))
        .node("B", ScriptedNode::new().then_fail("nope"))
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    graph.run(None).await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(GraphEvent::RunStarted { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        GraphEvent::Transitioned { from, to, .. } if from == "A" && to == "B"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        GraphEvent::Terminated { outcome: Outcome::Failed { .. }, node: Some(node), .. } if node == "B"
    )));
    assert!(matches!(
        events.last(),
        Some(GraphEvent::RunFinished { steps: 2, .. })
    ));
}

#[tokio::test]
async fn stepping_after_terminal_resumes_current_node() {
    let a = ScriptedNode::new()
        .then_stop()
        .then_patch(json!({"resumed": true}), Some("B"));
    let b = ScriptedNode::new();

    let mut graph = Graph::new("resume")
        .node("A", a.clone())
        .node("B", b.clone())
        .edge("A", "B")
        .set_start("A")
        .unwrap();

    assert!(!graph.step(None).await);
    assert_eq!(graph.state(), RunState::Completed);

    // Terminal states are not sticky: the next step asks A again
    assert!(graph.step(Some(Patch::set("operator", json!("go")))).await);
    assert_eq!(a.call_count(), 2);
    assert_eq!(a.calls()[1].context.get_str("operator"), Some("go"));
    assert_eq!(graph.current_node(), Some("B"));
    assert_eq!(graph.context().get("resumed"), Some(&json!(true)));
}

#[tokio::test]
async fn stepping_before_start_is_contained() {
    let mut graph = Graph::new("unstarted").node("A", ScriptedNode::new());

    assert!(!graph.step(Some(Patch::set("k", json!(1)))).await);
    assert!(matches!(graph.last_error(), Some(NodeflowError::NotStarted)));
    assert_eq!(graph.current_node(), None);
    // the patch was still merged
    assert_eq!(graph.context().get("k"), Some(&json!(1)));
}

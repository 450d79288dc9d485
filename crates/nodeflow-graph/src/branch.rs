use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::context::Context;
use nodeflow_core::error::Result;
use nodeflow_core::traits::{Node, NodeOutput, Transitions};

/// One routing rule: go to `target` when `expr` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRule {
    pub expr: String,
    pub target: String,
}

/// Routes on simple expressions over the context without touching it.
///
/// Rules are checked in order; the first one that matches and whose target is
/// wired from this node wins. When nothing matches the fallback (if any) is
/// returned as-is, otherwise the run stops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchNode {
    #[serde(default)]
    rules: Vec<BranchRule>,
    #[serde(default)]
    fallback: Option<String>,
}

impl BranchNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn when(mut self, expr: impl Into<String>, target: impl Into<String>) -> Self {
        self.rules.push(BranchRule {
            expr: expr.into(),
            target: target.into(),
        });
        self
    }

    /// Target used when no rule matches.
    pub fn otherwise(mut self, target: impl Into<String>) -> Self {
        self.fallback = Some(target.into());
        self
    }

    /// Pick a target for `context`, if any.
    pub fn route(&self, context: &Context, transitions: &Transitions) -> Option<String> {
        for rule in &self.rules {
            if !evaluate_condition(&rule.expr, context) {
                continue;
            }
            if transitions.contains(&rule.target) {
                return Some(rule.target.clone());
            }
            debug!(expr = %rule.expr, target = %rule.target, "Branch matched but target is not wired");
        }
        self.fallback.clone()
    }
}

impl Node for BranchNode {
    fn next(
        &self,
        context: Context,
        transitions: Transitions,
    ) -> BoxFuture<'_, Result<Option<NodeOutput>>> {
        Box::pin(async move { Ok(self.route(&context, &transitions).map(NodeOutput::goto)) })
    }
}

/// Evaluate a simple conditional expression against the context.
///
/// Supported expressions:
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal
/// - `key contains "substr"`: substring match
///
/// Non-string values are compared by their JSON rendering, so
/// `count == "3"` matches the number 3. Returns `false` for unparseable
/// expressions and missing keys.
pub fn evaluate_condition(expr: &str, context: &Context) -> bool {
    let expr = expr.trim();

    // key contains "value"
    if let Some((key, substr)) = parse_operator(expr, "contains") {
        return render(context, key).is_some_and(|s| s.contains(substr));
    }

    // key != "value"
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return render(context, key).is_some_and(|s| s != value);
    }

    // key == "value"
    if let Some((key, value)) = parse_operator(expr, "==") {
        return render(context, key).is_some_and(|s| s == value);
    }

    false
}

fn render(context: &Context, key: &str) -> Option<String> {
    context.get(key).map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Parse `key OP "value"` expressions, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, val.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::context::Patch;
    use serde_json::json;

    fn ctx(key: &str, value: serde_json::Value) -> Context {
        Context::new().apply(Patch::set(key, value))
    }

    fn wired(names: &[&str]) -> Transitions {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_condition_equals() {
        let c = ctx("status", json!("success"));
        assert!(evaluate_condition(r#"status == "success""#, &c));
        assert!(!evaluate_condition(r#"status == "failure""#, &c));
    }

    #[test]
    fn test_condition_not_equals() {
        let c = ctx("status", json!("success"));
        assert!(evaluate_condition(r#"status != "failure""#, &c));
        assert!(!evaluate_condition(r#"status != "success""#, &c));
    }

    #[test]
    fn test_condition_contains() {
        let c = ctx("output", json!("The file was created successfully."));
        assert!(evaluate_condition(r#"output contains "created""#, &c));
        assert!(!evaluate_condition(r#"output contains "deleted""#, &c));
    }

    #[test]
    fn test_condition_non_string_values() {
        let c = ctx("count", json!(3));
        assert!(evaluate_condition(r#"count == "3""#, &c));
        let c = ctx("done", json!(true));
        assert!(evaluate_condition("done == true", &c));
    }

    #[test]
    fn test_condition_missing_key_and_invalid_expr() {
        let c = Context::new();
        assert!(!evaluate_condition(r#"missing == "value""#, &c));
        assert!(!evaluate_condition("this is not valid", &c));
        assert!(!evaluate_condition(r#"== "x""#, &c));
    }

    #[test]
    fn test_route_skips_unwired_targets() {
        let node = BranchNode::new()
            .when(r#"kind == "question""#, "retrieve")
            .when(r#"kind == "question""#, "generate");
        let c = ctx("kind", json!("question"));

        assert_eq!(
            node.route(&c, &wired(&["generate"])).as_deref(),
            Some("generate")
        );
    }

    #[test]
    fn test_route_fallback_and_stop() {
        let c = ctx("kind", json!("chat"));
        let node = BranchNode::new().when(r#"kind == "question""#, "retrieve");
        assert_eq!(node.route(&c, &wired(&["retrieve"])), None);

        let node = node.otherwise("generate");
        assert_eq!(
            node.route(&c, &wired(&["retrieve"])).as_deref(),
            Some("generate")
        );
    }

    #[tokio::test]
    async fn test_branch_node_outputs_transition_only() {
        let node = BranchNode::new().when(r#"kind == "question""#, "retrieve");
        let out = node
            .next(ctx("kind", json!("question")), wired(&["retrieve"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.transition.as_deref(), Some("retrieve"));
        assert!(out.patch.is_none());
    }
}

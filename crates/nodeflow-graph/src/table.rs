use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use nodeflow_core::traits::Transitions;

/// A legal move between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeDef {
    /// Source node name.
    pub from: String,
    /// Target node name.
    pub to: String,
}

impl EdgeDef {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl<F: Into<String>, T: Into<String>> From<(F, T)> for EdgeDef {
    fn from((from, to): (F, T)) -> Self {
        Self::new(from, to)
    }
}

/// Outgoing destination sets keyed by source node name.
///
/// Registering the same pair twice is a no-op. Targets are not checked
/// against the node registry here; the engine does that when a transition
/// is taken.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    edges: HashMap<String, BTreeSet<String>>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `to` to the outgoing set of `from`. Returns `false` if it was already there.
    pub fn add(&mut self, from: impl Into<String>, to: impl Into<String>) -> bool {
        self.edges.entry(from.into()).or_default().insert(to.into())
    }

    /// Destinations wired from `from` (empty when none).
    pub fn outgoing(&self, from: &str) -> Transitions {
        self.edges.get(from).cloned().unwrap_or_default()
    }

    pub fn contains(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|set| set.contains(to))
    }

    /// Total number of distinct edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }

    /// All edges, sorted by source then target.
    pub fn to_edges(&self) -> Vec<EdgeDef> {
        let mut out: Vec<EdgeDef> = self
            .edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| EdgeDef::new(from, to)))
            .collect();
        out.sort();
        out
    }
}

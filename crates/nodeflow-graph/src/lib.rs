//! Graph execution engine: a named-node state machine over a shared context.
//!
//! A `Graph` owns a registry of `Node`s and a `TransitionTable` of legal
//! moves between them. Starting from the designated start node, each step
//! invokes the current node with the context snapshot and its wired
//! transitions, merges the node's patch, and follows the transition it names.
//!
//! Node failures and invalid transitions end the run quietly: they are logged,
//! published on the event bus and kept as `Graph::last_error`, but `run` and
//! `step` never return them.

pub mod branch;
pub mod executor;
pub mod table;

pub use branch::{evaluate_condition, BranchNode, BranchRule};
pub use executor::Graph;
pub use table::{EdgeDef, TransitionTable};

//! Retrieval-augmented generation on top of the graph engine.
//!
//! Three nodes cover the pipeline: `RetrieveNode` embeds the question and
//! pulls the closest chunks from the vector store, `GenerateNode` answers
//! from them, and the optional `RouteNode` lets the model decide whether a
//! question needs retrieval at all. `RagPipeline` wires them into a `Graph`.

pub mod generate;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod route;

pub use generate::GenerateNode;
pub use pipeline::{Answer, RagPipeline};
pub use retrieve::RetrieveNode;
pub use route::{parse_choice, RouteNode};

/// Context key holding the user's question.
pub const QUESTION: &str = "question";
/// Context key holding retrieved chunks.
pub const DOCUMENTS: &str = "documents";
/// Context key holding the generated answer.
pub const ANSWER: &str = "answer";
/// Context key holding the router's choice.
pub const ROUTE: &str = "route";

pub const ROUTE_NODE: &str = "route";
pub const RETRIEVE_NODE: &str = "retrieve";
pub const GENERATE_NODE: &str = "generate";

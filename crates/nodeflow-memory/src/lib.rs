pub mod chunker;
pub mod embeddings;
pub mod ingest;
pub mod store;

pub use chunker::{chunk_text, Chunk, ChunkOptions};
pub use embeddings::{cosine_similarity, create_provider, EmbeddingProvider, HttpEmbeddingProvider};
pub use ingest::ingest_text;
pub use store::{ScoredChunk, VectorStore};

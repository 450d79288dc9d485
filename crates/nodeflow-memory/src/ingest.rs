use tracing::info;

use nodeflow_core::error::{NodeflowError, Result};

use crate::chunker::{chunk_text, ChunkOptions};
use crate::embeddings::EmbeddingProvider;
use crate::store::VectorStore;

/// Chunk, embed and store `text` under `source`, replacing any earlier
/// version of that source. Returns the number of chunks stored.
pub async fn ingest_text(
    store: &VectorStore,
    embedder: &dyn EmbeddingProvider,
    source: &str,
    text: &str,
    opts: &ChunkOptions,
) -> Result<usize> {
    let chunks = chunk_text(text, opts);
    if chunks.is_empty() {
        info!(source, "Nothing to ingest");
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(NodeflowError::Embedding(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }

    let rows: Vec<_> = chunks.into_iter().zip(vectors).collect();
    let replaced = store.replace_source(source, &rows)?;
    let stored = rows.len();

    info!(source, stored, replaced, "Ingested document");
    Ok(stored)
}

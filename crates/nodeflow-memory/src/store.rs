use chrono::Utc;
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use nodeflow_core::error::{NodeflowError, Result};

use crate::chunker::Chunk;
use crate::embeddings::cosine_similarity;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source, chunk_index);";

/// A stored chunk with its similarity to a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub score: f32,
}

/// SQLite-backed chunk store with brute-force cosine search.
pub struct VectorStore {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> NodeflowError {
    NodeflowError::Database(e.to_string())
}

fn write_chunks(tx: &Transaction<'_>, source: &str, chunks: &[(Chunk, Vec<f32>)]) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    for (chunk, embedding) in chunks {
        let blob: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        tx.execute(
            "INSERT INTO chunks (source, chunk_index, content, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source, chunk.index as i64, chunk.text, blob, now],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

impl VectorStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                NodeflowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Vector store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store chunks of `source` with their embeddings. Returns the number inserted.
    pub fn insert_chunks(&self, source: &str, chunks: &[(Chunk, Vec<f32>)]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        write_chunks(&tx, source, chunks)?;
        tx.commit().map_err(db_err)?;

        debug!(source, count = chunks.len(), "Stored chunks");
        Ok(chunks.len())
    }

    /// Swap every chunk of `source` for `chunks` in one transaction. If any
    /// insert fails the earlier chunks are left untouched. Returns the number
    /// of chunks removed.
    pub fn replace_source(&self, source: &str, chunks: &[(Chunk, Vec<f32>)]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM chunks WHERE source = ?1", params![source])
            .map_err(db_err)?;
        write_chunks(&tx, source, chunks)?;
        tx.commit().map_err(db_err)?;

        debug!(source, removed, count = chunks.len(), "Replaced chunks");
        Ok(removed)
    }

    /// Remove every chunk of `source`. Returns the number removed.
    pub fn delete_source(&self, source: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute("DELETE FROM chunks WHERE source = ?1", params![source])
            .map_err(db_err)
    }

    /// Search for chunks similar to a query vector using cosine similarity.
    /// Results are sorted by similarity descending.
    pub fn search(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let conn = self.conn.lock().map_err(db_err)?;

        let mut stmt = conn
            .prepare("SELECT source, chunk_index, content, embedding FROM chunks")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                let source: String = row.get(0)?;
                let chunk_index: i64 = row.get(1)?;
                let content: String = row.get(2)?;
                let blob: Vec<u8> = row.get(3)?;
                Ok((source, chunk_index, content, blob))
            })
            .map_err(db_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (source, chunk_index, content, blob) = row.map_err(db_err)?;

            let embedding: Vec<f32> = blob
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();

            scored.push(ScoredChunk {
                source,
                chunk_index: chunk_index as usize,
                content,
                score: cosine_similarity(query_vec, &embedding),
            });
        }

        // Sort by similarity descending
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Total number of stored chunks.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as usize)
    }

    /// Distinct sources with their chunk counts, sorted by name.
    pub fn sources(&self) -> Result<Vec<(String, usize)>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT source, COUNT(*) FROM chunks GROUP BY source ORDER BY source")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let source: String = row.get(0)?;
                let n: i64 = row.get(1)?;
                Ok((source, n as usize))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    }

    /// Run raw SQL against the underlying connection.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(db_err)?;
        conn.execute_batch(sql).map_err(db_err)
    }
}

/// Makes every later insert into `chunks` fail.
#[cfg(test)]
pub(crate) const BLOCK_INSERTS: &str = "CREATE TRIGGER block_inserts BEFORE INSERT ON chunks
    BEGIN SELECT RAISE(ABORT, 'inserts blocked'); END;";

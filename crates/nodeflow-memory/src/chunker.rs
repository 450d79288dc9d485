use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use nodeflow_core::config::ChunkingConfig;
use nodeflow_core::error::{NodeflowError, Result};

/// Window size and overlap, both counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkOptions {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(NodeflowError::Config("chunk size must be > 0".into()));
        }
        if overlap >= size {
            return Err(NodeflowError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.size, config.overlap)
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// A slice of a source document. `start`/`end` are character offsets into
/// the whitespace-normalized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Split `text` into fixed-size character windows that overlap by
/// `opts.overlap` characters. Blank input yields no chunks.
pub fn chunk_text(text: &str, opts: &ChunkOptions) -> Vec<Chunk> {
    let normalized = whitespace().replace_all(text.trim(), " ");
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + opts.size).min(chars.len());
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            end,
            text: chars[start..end].iter().collect(),
        });
        if end == chars.len() {
            break;
        }
        start += opts.stride();
    }
    chunks
}

//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait owns every indexed chunk and answers nearest
//! neighbour queries. Backends:
//!
//! | Backend | Type | Persistence |
//! |---------|------|-------------|
//! | `memory` | [`MemoryIndex`] | process lifetime |
//! | `sqlite` | [`SqliteIndex`] | on-disk file, WAL mode |
//!
//! One instance is shared by the whole process behind an `Arc`. Writers
//! (a sync) and readers (questions) are not isolated from each other: a
//! search that runs while a document is being replaced may see it
//! half-updated or missing.
//!
//! Search results are ordered by descending cosine similarity; equal scores
//! keep insertion order (ascending `seq`), so ranking is stable.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::IndexConfig;
use crate::models::{DocumentEntry, IndexedChunk, ScoredChunk};

/// Embedding model an index was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingModelInfo {
    pub model: String,
    pub dims: usize,
}

/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | `add` | upsert chunks keyed by (document, chunk index) |
/// | `search` | top-k chunks by cosine similarity |
/// | `delete` | remove every chunk of a document |
/// | `replace_document` | delete + add as one unit |
/// | `count` | total chunks |
/// | `documents` | per-document chunk counts |
/// | `chunks_for` | a document's chunks with their vectors |
/// | `clear` | remove everything |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()>;

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Returns the number of chunks removed.
    async fn delete(&self, document: &str) -> Result<usize>;

    /// Swap a document's chunks for a new generation.
    async fn replace_document(&self, document: &str, chunks: Vec<IndexedChunk>) -> Result<usize> {
        let removed = self.delete(document).await?;
        self.add(chunks).await?;
        Ok(removed)
    }

    async fn count(&self) -> Result<usize>;

    /// Indexed documents, sorted by name.
    async fn documents(&self) -> Result<Vec<DocumentEntry>>;

    /// Chunks of `document` ordered by chunk index.
    async fn chunks_for(&self, document: &str) -> Result<Vec<IndexedChunk>>;

    /// Returns the number of chunks removed.
    async fn clear(&self) -> Result<usize>;

    async fn embedding_model(&self) -> Result<Option<EmbeddingModelInfo>>;

    async fn set_embedding_model(&self, info: &EmbeddingModelInfo) -> Result<()>;
}

/// Order candidates by descending score, then ascending `seq`, keep `k`.
pub fn rank(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
    candidates.truncate(k);
    candidates
}

/// Record the embedding model on first use and refuse a non-empty index
/// built with a different one.
pub async fn ensure_embedding_model(index: &dyn VectorIndex, wanted: &EmbeddingModelInfo) -> Result<()> {
    match index.embedding_model().await? {
        Some(existing) if existing == *wanted => Ok(()),
        Some(existing) if index.count().await? > 0 => bail!(
            "index was built with embedding model '{}' ({} dims) but '{}' ({} dims) is configured; \
             run `askdocs clear` and sync again",
            existing.model,
            existing.dims,
            wanted.model,
            wanted.dims
        ),
        _ => index.set_embedding_model(wanted).await,
    }
}

pub async fn open_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        "sqlite" => Ok(Arc::new(SqliteIndex::open(&config.path).await?)),
        other => bail!("Unknown index backend: {}", other),
    }
}

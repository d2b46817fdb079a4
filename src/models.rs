//! Core data models used throughout askdocs.
//!
//! These types represent the documents, chunks, retrieval results and sync
//! reports that flow through the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw document fetched by a source adapter, before text extraction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Unique within one sync cycle of a source (relative path, file name...).
    pub name: String,
    /// Label of the source that produced it, e.g. `github:courses`.
    pub source: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A document a source listed but could not fetch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub name: String,
    pub reason: String,
}

/// Result of [`DocumentSource::list_documents`](crate::traits::DocumentSource::list_documents).
#[derive(Debug, Clone, Default)]
pub struct SourceListing {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<FetchFailure>,
}

impl SourceListing {
    /// Everything the source advertised, fetched or not.
    pub fn discovered(&self) -> usize {
        self.documents.len() + self.failures.len()
    }
}

/// A chunk of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub document: String,
    pub chunk_index: usize,
    /// Offset of the first character of `text` in the document, in chars.
    pub char_offset: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its embedding, ready to be written to an index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub source: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub source: String,
    pub score: f32,
    /// Insertion sequence number, used to break score ties.
    pub seq: u64,
}

/// An indexed document and how many chunks it currently has.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    pub name: String,
    pub source: String,
    pub chunks: usize,
}

/// Generated answer plus the documents it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Distinct document names, in rank order of the chunks used.
    pub sources: Vec<String>,
    /// False when nothing relevant was retrieved and `text` is the
    /// not-found message.
    pub grounded: bool,
}

impl Answer {
    pub fn not_found() -> Self {
        Self {
            text: crate::error::NOT_FOUND_ANSWER.to_string(),
            sources: Vec::new(),
            grounded: false,
        }
    }
}

/// Pipeline stage at which a document was dropped during a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipStage {
    Fetch,
    Extract,
    Embed,
}

impl std::fmt::Display for SkipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipStage::Fetch => "fetch",
            SkipStage::Extract => "extract",
            SkipStage::Embed => "embed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub name: String,
    pub stage: SkipStage,
    pub reason: String,
}

/// Report of one sync run over one source.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub run_id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub discovered: usize,
    pub loaded: usize,
    pub skipped: Vec<SkippedDocument>,
    pub chunks_written: usize,
    pub embeddings_reused: usize,
    /// Previously indexed documents that the source no longer provides.
    pub pruned: Vec<String>,
    pub cancelled: bool,
}

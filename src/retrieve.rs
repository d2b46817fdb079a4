//! Question → nearest chunks.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_query, Embedder};
use crate::error::PipelineError;
use crate::models::ScoredChunk;
use crate::store::VectorIndex;

pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_relevance: f32,
}

impl Retriever {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        top_k: usize,
        min_relevance: f32,
    ) -> Self {
        Self {
            index,
            embedder,
            top_k,
            min_relevance,
        }
    }

    /// Top-k chunks at or above the relevance threshold, best first.
    ///
    /// Returns [`PipelineError::NoRelevantContext`] rather than an empty
    /// list, so callers cannot accidentally generate from nothing.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>, PipelineError> {
        let hits: Vec<ScoredChunk> = self
            .search(question, self.top_k)
            .await?
            .into_iter()
            .filter(|c| c.score >= self.min_relevance)
            .collect();

        if hits.is_empty() {
            return Err(PipelineError::NoRelevantContext);
        }
        Ok(hits)
    }

    /// Raw ranked search without the relevance threshold.
    pub async fn search(&self, question: &str, limit: usize) -> Result<Vec<ScoredChunk>, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        // Nothing to find: skip the embedding call.
        if self.index.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query = embed_query(self.embedder.as_ref(), question)
            .await
            .map_err(PipelineError::EmbeddingService)?;
        let hits = self.index.search(&query, limit.max(1)).await?;
        debug!(
            hits = hits.len(),
            best = hits.first().map(|h| h.score).unwrap_or(0.0),
            "retrieved"
        );
        Ok(hits)
    }
}

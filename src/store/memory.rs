//! In-memory [`VectorIndex`]: a `Vec` behind a tokio `RwLock`.
//!
//! Search is brute-force cosine similarity over every stored vector.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{rank, EmbeddingModelInfo, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::models::{DocumentEntry, IndexedChunk, ScoredChunk};

struct Stored {
    seq: u64,
    entry: IndexedChunk,
}

#[derive(Default)]
struct State {
    chunks: Vec<Stored>,
    next_seq: u64,
    model: Option<EmbeddingModelInfo>,
}

#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, chunks: Vec<IndexedChunk>) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        for entry in chunks {
            let existing = state.chunks.iter_mut().find(|s| {
                s.entry.chunk.document == entry.chunk.document
                    && s.entry.chunk.chunk_index == entry.chunk.chunk_index
            });
            match existing {
                Some(slot) => slot.entry = entry,
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    state.chunks.push(Stored { seq, entry });
                }
            }
        }
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().await;
        let candidates = state
            .chunks
            .iter()
            .map(|s| ScoredChunk {
                chunk: s.entry.chunk.clone(),
                source: s.entry.source.clone(),
                score: cosine_similarity(query, &s.entry.embedding),
                seq: s.seq,
            })
            .collect();
        Ok(rank(candidates, k))
    }

    async fn delete(&self, document: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.chunks.len();
        state.chunks.retain(|s| s.entry.chunk.document != document);
        Ok(before - state.chunks.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.chunks.len())
    }

    async fn documents(&self) -> Result<Vec<DocumentEntry>> {
        let state = self.state.read().await;
        let mut by_name: BTreeMap<&str, DocumentEntry> = BTreeMap::new();
        for s in &state.chunks {
            by_name
                .entry(s.entry.chunk.document.as_str())
                .or_insert_with(|| DocumentEntry {
                    name: s.entry.chunk.document.clone(),
                    source: s.entry.source.clone(),
                    chunks: 0,
                })
                .chunks += 1;
        }
        Ok(by_name.into_values().collect())
    }

    async fn chunks_for(&self, document: &str) -> Result<Vec<IndexedChunk>> {
        let state = self.state.read().await;
        let mut out: Vec<IndexedChunk> = state
            .chunks
            .iter()
            .filter(|s| s.entry.chunk.document == document)
            .map(|s| s.entry.clone())
            .collect();
        out.sort_by_key(|c| c.chunk.chunk_index);
        Ok(out)
    }

    async fn clear(&self) -> Result<usize> {
        let mut state = self.state.write().await;
        let removed = state.chunks.len();
        state.chunks.clear();
        Ok(removed)
    }

    async fn embedding_model(&self) -> Result<Option<EmbeddingModelInfo>> {
        Ok(self.state.read().await.model.clone())
    }

    async fn set_embedding_model(&self, info: &EmbeddingModelInfo) -> Result<()> {
        self.state.write().await.model = Some(info.clone());
        Ok(())
    }
}

//! Sync pipeline: source → extract → chunk → embed → index.
//!
//! [`run_sync`] drives one source through the pipeline. Failures are
//! isolated per document: a document that cannot be fetched, extracted or
//! embedded is recorded in the [`SyncSummary`] and the batch moves on. Only
//! an unavailable source or a broken index aborts the run.
//!
//! After a complete (not cancelled) run, documents of the same source that
//! the source no longer lists are pruned. A listed document that failed this
//! run keeps its previous generation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_text, ChunkParams};
use crate::config::ExtractConfig;
use crate::embedding::{embed_all, Embedder};
use crate::error::{PipelineError, ServiceError};
use crate::extract::extract_document;
use crate::models::{IndexedChunk, SkipStage, SkippedDocument, SyncSummary};
use crate::store::VectorIndex;
use crate::traits::DocumentSource;

/// Cooperative cancellation for a running sync, checked between documents.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What [`Indexer::index_document`] wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutcome {
    pub chunks: usize,
    /// Chunks whose vector came from the previous generation.
    pub reused: usize,
}

/// Chunks, embeds and stores one document at a time.
pub struct Indexer {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    params: ChunkParams,
    batch_size: usize,
    reuse_embeddings: bool,
}

impl Indexer {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        params: ChunkParams,
        batch_size: usize,
        reuse_embeddings: bool,
    ) -> Self {
        Self {
            index,
            embedder,
            params,
            batch_size,
            reuse_embeddings,
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Replace the indexed generation of `name` with chunks of `text`.
    ///
    /// Every chunk is embedded before anything is written, so an embedding
    /// failure leaves the index untouched.
    pub async fn index_document(
        &self,
        text: &str,
        name: &str,
        source: &str,
    ) -> Result<IndexOutcome, PipelineError> {
        let chunks = chunk_text(name, text, &self.params);
        let dims = self.embedder.dims();

        let previous: HashMap<String, Vec<f32>> = if self.reuse_embeddings {
            self.index
                .chunks_for(name)
                .await?
                .into_iter()
                .filter(|c| c.embedding.len() == dims)
                .map(|c| (c.chunk.hash, c.embedding))
                .collect()
        } else {
            HashMap::new()
        };

        let reused: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| previous.get(&c.hash).cloned())
            .collect();
        let missing: Vec<String> = chunks
            .iter()
            .zip(&reused)
            .filter(|(_, r)| r.is_none())
            .map(|(c, _)| c.text.clone())
            .collect();

        let reused_count = chunks.len() - missing.len();
        let mut fresh = embed_all(self.embedder.as_ref(), &missing, self.batch_size)
            .await
            .map_err(PipelineError::EmbeddingService)?
            .into_iter();

        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, reused) in chunks.into_iter().zip(reused) {
            let embedding = match reused {
                Some(v) => v,
                None => fresh.next().ok_or_else(|| {
                    PipelineError::EmbeddingService(ServiceError::InvalidResponse(
                        "fewer embeddings than chunks".to_string(),
                    ))
                })?,
            };
            entries.push(IndexedChunk {
                chunk,
                source: source.to_string(),
                embedding,
            });
        }

        let count = entries.len();
        let removed = self.index.replace_document(name, entries).await?;
        debug!(
            document = name,
            chunks = count,
            reused = reused_count,
            removed,
            "document indexed"
        );

        Ok(IndexOutcome {
            chunks: count,
            reused: reused_count,
        })
    }
}

/// Sync one source into the index.
pub async fn run_sync(
    source: &dyn DocumentSource,
    indexer: &Indexer,
    extract: &ExtractConfig,
    cancel: &CancelFlag,
) -> Result<SyncSummary, PipelineError> {
    let run_id = Uuid::new_v4().to_string();
    let label = source.source_label();
    let started_at = Utc::now();
    info!(run_id = %run_id, source = %label, "sync started");

    let listing = source.list_documents().await?;
    let discovered = listing.discovered();

    let mut skipped: Vec<SkippedDocument> = listing
        .failures
        .into_iter()
        .map(|f| SkippedDocument {
            name: f.name,
            stage: SkipStage::Fetch,
            reason: f.reason,
        })
        .collect();

    let mut loaded_names: HashSet<String> = HashSet::new();
    let mut chunks_written = 0usize;
    let mut embeddings_reused = 0usize;
    let mut cancelled = false;

    for doc in listing.documents {
        if cancel.is_cancelled() {
            cancelled = true;
            info!(run_id = %run_id, source = %label, "sync cancelled");
            break;
        }

        let name = doc.name.clone();
        let config = extract.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_document(&doc, &config))
            .await
            .unwrap_or_else(|e| Err(PipelineError::extraction_failed(&name, e)));
        let text = match extracted {
            Ok(text) => text,
            Err(e) => {
                warn!(source = %label, document = %name, error = %e, "skipping document");
                skipped.push(SkippedDocument {
                    name,
                    stage: SkipStage::Extract,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        match indexer.index_document(&text, &name, &label).await {
            Ok(outcome) => {
                chunks_written += outcome.chunks;
                embeddings_reused += outcome.reused;
                loaded_names.insert(name);
            }
            Err(e @ PipelineError::EmbeddingService(_)) => {
                warn!(source = %label, document = %name, error = %e, "skipping document");
                skipped.push(SkippedDocument {
                    name,
                    stage: SkipStage::Embed,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    // Listed documents that failed this run keep their previous generation.
    let mut pruned = Vec::new();
    if !cancelled {
        let listed: HashSet<&str> = skipped.iter().map(|s| s.name.as_str()).collect();
        for entry in indexer.index().documents().await? {
            if entry.source == label
                && !loaded_names.contains(&entry.name)
                && !listed.contains(entry.name.as_str())
            {
                indexer.index().delete(&entry.name).await?;
                pruned.push(entry.name);
            }
        }
    }

    let summary = SyncSummary {
        run_id,
        source: label,
        started_at,
        finished_at: Utc::now(),
        discovered,
        loaded: loaded_names.len(),
        skipped,
        chunks_written,
        embeddings_reused,
        pruned,
        cancelled,
    };
    info!(
        run_id = %summary.run_id,
        source = %summary.source,
        discovered = summary.discovered,
        loaded = summary.loaded,
        skipped = summary.skipped.len(),
        chunks = summary.chunks_written,
        pruned = summary.pruned.len(),
        "sync finished"
    );
    Ok(summary)
}

/// Human-readable summary on stdout.
pub fn print_summary(summary: &SyncSummary) {
    println!("sync {}", summary.source);
    println!("  run: {}", summary.run_id);
    println!("  loaded: {}/{}", summary.loaded, summary.discovered);
    println!("  chunks written: {}", summary.chunks_written);
    if summary.embeddings_reused > 0 {
        println!("  embeddings reused: {}", summary.embeddings_reused);
    }
    if !summary.skipped.is_empty() {
        println!("  skipped: {}", summary.skipped.len());
        for s in &summary.skipped {
            println!("    {} [{}]: {}", s.name, s.stage, s.reason);
        }
    }
    if !summary.pruned.is_empty() {
        println!("  pruned: {}", summary.pruned.join(", "));
    }
    if summary.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}

//! Application root.
//!
//! [`App`] owns everything a command or request handler needs: the vector
//! index, the embedder shared by indexing and retrieval, the generator, the
//! configured sources, and the sync lock. The CLI builds one per process;
//! the server shares one across handlers behind an `Arc`.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::answer::AnswerComposer;
use crate::chunk::ChunkParams;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::PipelineError;
use crate::generation::{create_generator, Generator};
use crate::ingest::{run_sync, CancelFlag, Indexer};
use crate::models::{Answer, DocumentEntry, ScoredChunk, SyncSummary};
use crate::retrieve::Retriever;
use crate::sources::build_registry;
use crate::status::{collect_status, IndexStatus};
use crate::store::{ensure_embedding_model, open_index, EmbeddingModelInfo, VectorIndex};
use crate::traits::{DocumentSource, SourceRegistry};

pub struct App {
    config: Config,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    sources: SourceRegistry,
    indexer: Indexer,
    composer: AnswerComposer,
    sync_lock: Mutex<()>,
    cancel: CancelFlag,
}

impl App {
    /// Build the application from config: open the index, refuse it if it
    /// was built with a different embedding model, and instantiate
    /// providers and sources.
    pub async fn open(config: Config) -> Result<Self> {
        let index = open_index(&config.index).await?;
        let embedder = create_embedder(&config.embedding)?;
        ensure_embedding_model(
            index.as_ref(),
            &EmbeddingModelInfo {
                model: embedder.model_name().to_string(),
                dims: embedder.dims(),
            },
        )
        .await?;
        let generator = create_generator(&config.generation)?;
        let sources = build_registry(&config)?;
        info!(
            backend = index.backend(),
            embedder = embedder.model_name(),
            generator = generator.model_name(),
            sources = sources.len(),
            "askdocs ready"
        );
        Self::from_parts(config, index, embedder, generator, sources)
    }

    /// Assemble an app from already-built parts.
    pub fn from_parts(
        config: Config,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        sources: SourceRegistry,
    ) -> Result<Self> {
        let params = ChunkParams::new(config.chunking.chunk_size, config.chunking.overlap)?;
        let indexer = Indexer::new(
            index.clone(),
            embedder.clone(),
            params,
            config.embedding.batch_size,
            config.indexing.reuse_embeddings,
        );
        let retriever = Retriever::new(
            index.clone(),
            embedder.clone(),
            config.retrieval.top_k,
            config.retrieval.min_relevance,
        );
        let composer = AnswerComposer::new(
            retriever,
            generator.clone(),
            config.retrieval.max_context_chars,
        );

        Ok(Self {
            config,
            index,
            embedder,
            generator,
            sources,
            indexer,
            composer,
            sync_lock: Mutex::new(()),
            cancel: CancelFlag::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn resolve(&self, target: &str) -> Result<Vec<&dyn DocumentSource>, PipelineError> {
        if target == "all" {
            return Ok(self.sources.iter().collect());
        }
        if let Some(source) = self.sources.get(target) {
            return Ok(vec![source]);
        }
        // A bare instance name is accepted when it is unambiguous.
        let by_name: Vec<&dyn DocumentSource> =
            self.sources.iter().filter(|s| s.name() == target).collect();
        if by_name.len() == 1 {
            return Ok(by_name);
        }
        Err(PipelineError::UnknownSource(target.to_string()))
    }

    /// Sync one source (`github:courses`) or every source (`all`).
    ///
    /// At most one sync runs at a time; a concurrent call fails with
    /// [`PipelineError::SyncInProgress`]. With `all`, a source that is
    /// unavailable is logged and the next one is synced; the error is
    /// returned only if no source could be synced at all.
    pub async fn sync(&self, target: &str) -> Result<Vec<SyncSummary>, PipelineError> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| PipelineError::SyncInProgress)?;
        self.cancel.reset();

        let targets = self.resolve(target)?;
        let single = targets.len() == 1 && target != "all";
        let mut summaries = Vec::new();
        let mut first_error = None;

        for source in targets {
            match run_sync(source, &self.indexer, &self.config.extract, &self.cancel).await {
                Ok(summary) => {
                    let cancelled = summary.cancelled;
                    summaries.push(summary);
                    if cancelled {
                        break;
                    }
                }
                Err(e) if single => return Err(e),
                Err(e @ PipelineError::SourceUnavailable { .. }) => {
                    warn!(source = %source.source_label(), error = %e, "source skipped");
                    first_error.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }

        match first_error {
            Some(e) if summaries.is_empty() => Err(e),
            _ => Ok(summaries),
        }
    }

    /// Ask the running sync to stop after its current document.
    /// Returns whether a sync was running.
    pub fn cancel_sync(&self) -> bool {
        let running = self.sync_lock.try_lock().is_err();
        if running {
            self.cancel.cancel();
        }
        running
    }

    pub fn sync_running(&self) -> bool {
        self.sync_lock.try_lock().is_err()
    }

    pub async fn ask(&self, question: &str) -> Result<Answer, PipelineError> {
        self.composer.answer(question).await
    }

    /// Retrieval only; `limit` defaults to `retrieval.top_k`.
    pub async fn search(
        &self,
        question: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        let limit = limit.unwrap_or(self.config.retrieval.top_k);
        self.composer.retriever().search(question, limit).await
    }

    pub async fn documents(&self) -> Result<Vec<DocumentEntry>, PipelineError> {
        Ok(self.index.documents().await?)
    }

    /// Remove every chunk. Refused while a sync is running.
    pub async fn clear(&self) -> Result<usize, PipelineError> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| PipelineError::SyncInProgress)?;
        let removed = self.index.clear().await?;
        info!(removed, "index cleared");
        Ok(removed)
    }

    pub async fn status(&self) -> Result<IndexStatus, PipelineError> {
        collect_status(
            &self.config.index,
            self.index.as_ref(),
            self.embedder.as_ref(),
            self.generator.as_ref(),
            self.sync_running(),
        )
        .await
    }
}

//! Embedding providers and vector utilities.
//!
//! Defines the [`Embedder`] trait and its implementations:
//! - **[`OpenAiEmbedder`]**: `POST /v1/embeddings` on OpenAI, or on Mistral
//!   (same wire format, different base URL and key).
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//! - **[`HashedEmbedder`]**: offline feature hashing, no model download.
//! - **`LocalEmbedder`**: fastembed models, behind the
//!   `local-embeddings-fastembed` feature.
//!
//! Indexing and question answering share one embedder instance built by
//! [`create_embedder`], so chunks and questions are always embedded by the
//! same model.
//!
//! Also provides the vector helpers used by the index backends:
//! [`cosine_similarity`], [`vec_to_blob`] and [`blob_to_vec`].

mod hashed;
#[cfg(feature = "local-embeddings-fastembed")]
mod local;

pub use hashed::HashedEmbedder;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::ServiceError;
use crate::http;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// Embed a batch of texts; the output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// Embed `texts` in batches of `batch_size`, checking count and dimension.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed(batch).await?;
        if vectors.len() != batch.len() {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dims()) {
            return Err(ServiceError::InvalidResponse(format!(
                "expected dimension {}, got {}",
                embedder.dims(),
                bad.len()
            )));
        }
        out.extend(vectors);
    }
    Ok(out)
}

/// Embed a single question.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, ServiceError> {
    let mut vectors = embed_all(embedder, &[text.to_string()], 1).await?;
    vectors
        .pop()
        .ok_or_else(|| ServiceError::InvalidResponse("empty embedding response".to_string()))
}

// ============ OpenAI-compatible Provider ============

/// Embeddings over the OpenAI wire format.
///
/// Used for both OpenAI (`OPENAI_API_KEY`) and Mistral (`MISTRAL_API_KEY`);
/// `embedding.api_key_env` overrides the variable and `embedding.url` the
/// base URL.
pub struct OpenAiEmbedder {
    service: &'static str,
    model: String,
    dims: usize,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn openai(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_service(config, "openai", "https://api.openai.com", "OPENAI_API_KEY")
    }

    pub fn mistral(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_service(config, "mistral", "https://api.mistral.ai", "MISTRAL_API_KEY")
    }

    fn with_service(
        config: &EmbeddingConfig,
        service: &'static str,
        default_base: &str,
        default_key_env: &str,
    ) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", service))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", service))?;
        let key_env = config.api_key_env.as_deref().unwrap_or(default_key_env);
        let api_key = match std::env::var(key_env) {
            Ok(key) => key,
            Err(_) => bail!("{} environment variable not set", key_env),
        };
        let base = config.url.as_deref().unwrap_or(default_base);
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            service,
            model,
            dims,
            endpoint: format!("{}/v1/embeddings", base.trim_end_matches('/')),
            api_key,
            client: http::build_client(timeout)?,
            max_retries: config.max_retries,
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::send_json(
            self.service,
            || {
                self.client
                    .post(&self.endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
            },
            self.max_retries,
            self.timeout,
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ServiceError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| ServiceError::InvalidResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| ServiceError::InvalidResponse("missing embedding".to_string()))?;
        indexed.push((index, json_to_vec(embedding)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn json_to_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Ollama Provider ============

/// Embeddings from a local Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config.url.as_deref().unwrap_or("http://localhost:11434");
        let timeout = Duration::from_secs(config.timeout_secs);

        Ok(Self {
            model,
            dims,
            endpoint: format!("{}/api/embed", url.trim_end_matches('/')),
            client: http::build_client(timeout)?,
            max_retries: config.max_retries,
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::send_json(
            "ollama",
            || self.client.post(&self.endpoint).json(&body),
            self.max_retries,
            self.timeout,
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, ServiceError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| ServiceError::InvalidResponse("missing embeddings array".to_string()))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| json_to_vec(values))
                .ok_or_else(|| ServiceError::InvalidResponse("embedding is not an array".to_string()))
        })
        .collect()
}

/// Build the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAiEmbedder::openai`] |
/// | `"mistral"` | [`OpenAiEmbedder::mistral`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"hashed"` | [`HashedEmbedder`] |
/// | `"local"` | `LocalEmbedder` (feature `local-embeddings-fastembed`) |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::openai(config)?)),
        "mistral" => Ok(Arc::new(OpenAiEmbedder::mistral(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "hashed" => Ok(Arc::new(HashedEmbedder::new(
            config.dims.unwrap_or(hashed::DEFAULT_DIMS),
        ))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

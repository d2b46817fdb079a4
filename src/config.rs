//! TOML configuration.
//!
//! Every section except `[sources.*]` has defaults, so an empty file is a
//! valid (offline, in-memory) configuration. Credentials never live in the
//! file: adapters and providers read them from the environment variable
//! named by their `token_env` / `api_key_env` field.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

// ============ Index ============

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_index_path(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/askdocs.sqlite")
}

// ============ Chunking / extraction ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    /// A PDF strategy is accepted once its trimmed output has at least this
    /// many characters.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_min_chars() -> usize {
    100
}
fn default_max_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndexingConfig {
    /// Reuse the previous vector of a chunk whose text hash is unchanged.
    #[serde(default)]
    pub reuse_embeddings: bool,
}

// ============ Retrieval ============

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Cosine similarity below which a chunk is not considered relevant.
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,
    /// Upper bound on the whole generation prompt, in characters. Retrieved
    /// context fills what the instructions and question leave over.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_relevance: default_min_relevance(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_relevance() -> f32 {
    0.2
}
fn default_max_context_chars() -> usize {
    6000
}

// ============ Providers ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override (Ollama server, OpenAI-compatible proxy).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
            api_key_env: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_network(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "mistral" | "ollama")
    }
}

fn default_embedding_provider() -> String {
    "hashed".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    1
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout_secs: default_generation_timeout_secs(),
            url: None,
            api_key_env: None,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_generation_timeout_secs() -> u64 {
    60
}

// ============ Server / logging ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

// ============ Sources ============

/// Named source instances, grouped by adapter type.
///
/// ```toml
/// [sources.filesystem.notes]
/// root = "./docs"
///
/// [sources.github.courses]
/// repo = "acme/course-material"
/// ```
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub filesystem: BTreeMap<String, FilesystemSourceConfig>,
    #[serde(default)]
    pub github: BTreeMap<String, GithubSourceConfig>,
    #[serde(default)]
    pub drive: BTreeMap<String, DriveSourceConfig>,
    #[serde(default)]
    pub url: BTreeMap<String, UrlSourceConfig>,
}

impl SourcesConfig {
    pub fn is_empty(&self) -> bool {
        self.filesystem.is_empty()
            && self.github.is_empty()
            && self.drive.is_empty()
            && self.url.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    ["**/*.pdf", "**/*.docx", "**/*.txt", "**/*.md"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    /// `owner/name`.
    pub repo: String,
    /// Directory inside the repository; empty for the root.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveSourceConfig {
    pub folder_id: String,
    #[serde(default = "default_drive_token_env")]
    pub token_env: String,
    #[serde(default = "default_drive_api")]
    pub api_base: String,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_drive_token_env() -> String {
    "GOOGLE_DRIVE_TOKEN".to_string()
}
fn default_drive_api() -> String {
    "https://www.googleapis.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UrlSourceConfig {
    pub urls: Vec<String>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_source_timeout_secs() -> u64 {
    30
}

// ============ Loading ============

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.index.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown index backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    // Chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be < chunking.chunk_size");
    }

    // Retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_relevance) {
        anyhow::bail!("retrieval.min_relevance must be in [-1.0, 1.0]");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    // Embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" | "mistral" | "ollama" | "hashed" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, mistral, ollama, hashed, or local.",
            other
        ),
    }
    if embedding.is_network() {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    if embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if embedding.max_retries > 1 {
        anyhow::bail!("embedding.max_retries must be 0 or 1");
    }
    if embedding.timeout_secs == 0 {
        anyhow::bail!("embedding.timeout_secs must be > 0");
    }

    // Generation
    let generation = &config.generation;
    match generation.provider.as_str() {
        "disabled" | "openai" | "anthropic" | "mistral" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, anthropic, or mistral.",
            other
        ),
    }
    if generation.max_retries > 1 {
        anyhow::bail!("generation.max_retries must be 0 or 1");
    }
    if generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }

    match config.logging.format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("Unknown logging format: '{}'. Must be pretty or json.", other),
    }

    // Sources
    let sources = &config.sources;
    for (name, gh) in &sources.github {
        if !gh.repo.contains('/') {
            anyhow::bail!("sources.github.{}.repo must look like 'owner/name'", name);
        }
        if gh.timeout_secs == 0 {
            anyhow::bail!("sources.github.{}.timeout_secs must be > 0", name);
        }
    }
    for (name, drive) in &sources.drive {
        if drive.folder_id.trim().is_empty() {
            anyhow::bail!("sources.drive.{}.folder_id must not be empty", name);
        }
        if drive.timeout_secs == 0 {
            anyhow::bail!("sources.drive.{}.timeout_secs must be > 0", name);
        }
    }
    for (name, url) in &sources.url {
        if url.timeout_secs == 0 {
            anyhow::bail!("sources.url.{}.timeout_secs must be > 0", name);
        }
    }

    Ok(())
}

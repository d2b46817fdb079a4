//! Document source abstraction.
//!
//! Every place documents come from (a local folder, a GitHub repository, a
//! Google Drive folder, a list of URLs) implements [`DocumentSource`]. The
//! sync pipeline only sees this trait.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             SourceRegistry               │
//! │  ┌──────────┐ ┌────────┐ ┌───────┐ ┌───┐ │
//! │  │filesystem│ │ github │ │ drive │ │url│ │
//! │  └──────────┘ └────────┘ └───────┘ └───┘ │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          run_sync() → extract → chunk → embed → index
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use askdocs::error::PipelineError;
//! use askdocs::models::{SourceDocument, SourceListing};
//! use askdocs::traits::{DocumentSource, SourceRegistry};
//!
//! struct Fixed;
//!
//! #[async_trait]
//! impl DocumentSource for Fixed {
//!     fn name(&self) -> &str { "fixed" }
//!
//!     async fn list_documents(&self) -> Result<SourceListing, PipelineError> {
//!         Ok(SourceListing {
//!             documents: vec![SourceDocument {
//!                 name: "hello.txt".into(),
//!                 source: self.source_label(),
//!                 content_type: "text/plain".into(),
//!                 bytes: b"hello".to_vec(),
//!             }],
//!             failures: vec![],
//!         })
//!     }
//! }
//!
//! let mut registry = SourceRegistry::new();
//! registry.register(Box::new(Fixed));
//! assert!(registry.get("custom:fixed").is_some());
//! ```

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::models::SourceListing;

// ═══════════════════════════════════════════════════════════════════════
// DocumentSource Trait
// ═══════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Instance name from the config table key (e.g. `"courses"`).
    fn name(&self) -> &str;

    /// Adapter type (`"filesystem"`, `"github"`, `"drive"`, `"url"`).
    fn source_type(&self) -> &str {
        "custom"
    }

    /// `"{type}:{name}"`, stamped on every document and chunk.
    fn source_label(&self) -> String {
        format!("{}:{}", self.source_type(), self.name())
    }

    /// Fetch every document the source currently provides.
    ///
    /// Fails as a whole only when the listing itself is impossible
    /// ([`PipelineError::SourceUnavailable`]). A document that was listed
    /// but could not be downloaded is reported in
    /// [`SourceListing::failures`] and does not abort the others. No
    /// retries.
    async fn list_documents(&self) -> Result<SourceListing, PipelineError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Configured sources, in registration order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<Box<dyn DocumentSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn DocumentSource>) {
        self.sources.push(source);
    }

    /// Look up a source by label (`github:courses`).
    pub fn get(&self, label: &str) -> Option<&dyn DocumentSource> {
        self.sources
            .iter()
            .find(|s| s.source_label() == label)
            .map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DocumentSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    pub fn labels(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.source_label()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

//! Typed failures of the question-answering pipeline.
//!
//! Per-document failures during a sync (fetch, extract, embed) never abort
//! the batch: the sync loop converts them into [`SkippedDocument`](crate::models::SkippedDocument)
//! entries. Per-question failures are returned to the caller, who shows
//! [`PipelineError::user_message`] instead of the raw error.
//!
//! Application plumbing (config loading, CLI, server start-up) stays on
//! `anyhow`.

use std::time::Duration;

use thiserror::Error;

/// Text shown when retrieval finds nothing relevant.
pub const NOT_FOUND_ANSWER: &str =
    "I could not find anything in the indexed documents that answers this question.";

/// Failure talking to an external embedding or generation service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Transient failures get one immediate retry; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) | ServiceError::Connection(_) => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::InvalidResponse(_) | ServiceError::Unavailable(_) => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(timeout)
        } else if err.is_decode() {
            ServiceError::InvalidResponse(err.to_string())
        } else {
            ServiceError::Connection(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source {label} unavailable: {reason}")]
    SourceUnavailable { label: String, reason: String },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("extraction failed for {name}: {reason}")]
    ExtractionFailed { name: String, reason: String },

    #[error("embedding service error: {0}")]
    EmbeddingService(ServiceError),

    #[error("generation service error: {0}")]
    GenerationService(ServiceError),

    #[error("no relevant context found")]
    NoRelevantContext,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("a sync is already running")]
    SyncInProgress,

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("index error: {0}")]
    Index(String),
}

impl PipelineError {
    pub fn source_unavailable(label: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::SourceUnavailable {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction_failed(name: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::ExtractionFailed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::SourceUnavailable { .. } => "source_unavailable",
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::EmbeddingService(_) => "embedding_service_error",
            PipelineError::GenerationService(_) => "generation_service_error",
            PipelineError::NoRelevantContext => "no_relevant_context",
            PipelineError::EmptyQuestion => "bad_request",
            PipelineError::SyncInProgress => "sync_in_progress",
            PipelineError::UnknownSource(_) => "unknown_source",
            PipelineError::Index(_) => "index_error",
        }
    }

    /// Message meant for the person who asked the question.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::NoRelevantContext => NOT_FOUND_ANSWER.to_string(),
            PipelineError::EmptyQuestion => "Please ask a question.".to_string(),
            PipelineError::EmbeddingService(_) => {
                "Sorry, I could not process your question right now. Please try again in a moment."
                    .to_string()
            }
            PipelineError::GenerationService(_) => {
                "Sorry, the language model could not produce an answer right now. Please try again in a moment."
                    .to_string()
            }
            PipelineError::SyncInProgress => {
                "A sync is already running. Please wait for it to finish.".to_string()
            }
            PipelineError::UnknownSource(name) => format!("Unknown source '{}'.", name),
            PipelineError::SourceUnavailable { label, .. } => {
                format!("Sorry, the source '{}' is unavailable right now.", label)
            }
            _ => "Sorry, something went wrong while answering your question.".to_string(),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Index(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Connection("refused".into()).is_transient());
        assert!(ServiceError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(ServiceError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ServiceError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ServiceError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn test_user_message_never_leaks_details() {
        let err = PipelineError::GenerationService(ServiceError::Status {
            status: 500,
            body: "internal trace id 1234".into(),
        });
        assert!(!err.user_message().contains("1234"));
        assert_eq!(
            PipelineError::NoRelevantContext.user_message(),
            NOT_FOUND_ANSWER
        );
    }
}

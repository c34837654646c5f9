//! Error types for jewel-search
//!
//! Fatal kinds (`Transcription`, `Embedding`, `Retrieval`) abort a request.
//! `Translation`, `Captioning` and `Scoring` are caught inside the pipeline:
//! translation failures degrade the query, captioning failures leave the
//! image uncaptioned, scoring failures drop a single candidate.

use thiserror::Error;

/// Search pipeline error
#[derive(Debug, Error)]
pub enum SearchError {
    /// Translation service failed (recoverable: degraded mode)
    #[error("Translation failed: {0}")]
    Translation(String),

    /// Speech-to-text failed (fatal: no text to fall back on)
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Image captioning failed (recoverable: image searched without caption)
    #[error("Captioning failed: {0}")]
    Captioning(String),

    /// Embedding model returned an unusable vector (fatal: config mismatch)
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Similarity index unavailable after retry (fatal)
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Scoring a single candidate failed (recoverable: candidate dropped)
    #[error("Scoring failed for {item_id}: {message}")]
    Scoring { item_id: String, message: String },

    /// Page or image behind a query URL could not be fetched
    #[error("Image fetch failed: {0}")]
    ImageFetch(String),

    /// Query input rejected before any external call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller abandoned the request
    #[error("Search cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] jewel_common::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    /// Stable error kind for user-facing output
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::Translation(_) => "translation",
            SearchError::Transcription(_) => "transcription",
            SearchError::Captioning(_) => "captioning",
            SearchError::Embedding(_) => "embedding",
            SearchError::Retrieval(_) => "retrieval",
            SearchError::Scoring { .. } => "scoring",
            SearchError::ImageFetch(_) => "image_fetch",
            SearchError::InvalidInput(_) => "invalid_input",
            SearchError::Cancelled => "cancelled",
            SearchError::Config(_) => "config",
            SearchError::Io(_) => "io",
        }
    }

    /// Whether the pipeline aborts the request on this error
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SearchError::Translation(_)
                | SearchError::Captioning(_)
                | SearchError::Scoring { .. }
        )
    }
}

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

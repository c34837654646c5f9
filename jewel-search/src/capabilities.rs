//! External service capabilities
//!
//! Every remote dependency of the pipeline is a trait object. Concrete
//! bindings live in [`crate::clients`]; tests substitute in-memory mocks.
//! A [`Capabilities`] bundle is built once at startup and shared read-only by
//! every request.

use crate::error::{SearchError, SearchResult};
use crate::types::{AudioClip, Candidate, EmbeddingVector, ImageDescription, ImageRef, Metadata, Query};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Text translation into the working language
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text`; `source_lang` of `None` lets the service auto-detect
    async fn translate(&self, text: &str, source_lang: Option<&str>) -> SearchResult<String>;
}

/// Speech-to-text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioClip) -> SearchResult<String>;
}

/// Text encoder of the shared text/image embedding space
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> SearchResult<EmbeddingVector>;
}

/// Image encoder of the shared text/image embedding space
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed_image(&self, image: &ImageRef) -> SearchResult<EmbeddingVector>;
}

/// Vision captioning and jewelry localization of query images
#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// Caption `image`; the region, if any, is where the jewelry was found
    ///
    /// # Errors
    /// `SearchError::Captioning`; callers continue without a caption.
    async fn describe_image(&self, image: &ImageRef) -> SearchResult<ImageDescription>;
}

/// One nearest-neighbor hit as returned by the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub item_id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Similarity index failure, classified for the retry policy
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// Network failure, timeout, overload: worth one retry
    #[error("transient index failure: {0}")]
    Transient(String),

    /// Bad request, missing collection, malformed response: never retried
    #[error("index failure: {0}")]
    Permanent(String),
}

impl IndexError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Transient(_))
    }
}

/// Nearest-neighbor lookup over catalog vectors
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn nearest_neighbors(
        &self,
        vector: &EmbeddingVector,
        top_n: usize,
    ) -> Result<Vec<IndexHit>, IndexError>;
}

/// Higher-fidelity cross-modal relevance scoring of one candidate
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score `candidate` against `query`
    ///
    /// # Errors
    /// `SearchError::Scoring` for a per-candidate failure; the batch continues.
    async fn rerank(&self, query: &Query, candidate: &Candidate) -> SearchResult<f32>;
}

/// Read-only bundle of every external capability
#[derive(Clone)]
pub struct Capabilities {
    pub translator: Arc<dyn Translator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub text_embedder: Arc<dyn TextEmbedder>,
    pub image_embedder: Arc<dyn ImageEmbedder>,
    /// Optional: captioning is best-effort
    pub describer: Option<Arc<dyn ImageDescriber>>,
    pub index: Arc<dyn SimilarityIndex>,
    pub scorer: Arc<dyn RelevanceScorer>,
}

/// Stand-in for a language service that is not configured
///
/// Translation always fails (queries run in degraded mode) and transcription
/// always fails (audio queries are rejected).
#[derive(Debug, Clone)]
pub struct UnconfiguredLanguageService {
    reason: String,
}

impl UnconfiguredLanguageService {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Translator for UnconfiguredLanguageService {
    async fn translate(&self, _text: &str, _source_lang: Option<&str>) -> SearchResult<String> {
        Err(SearchError::Translation(self.reason.clone()))
    }
}

#[async_trait]
impl Transcriber for UnconfiguredLanguageService {
    async fn transcribe(&self, _audio: &AudioClip) -> SearchResult<String> {
        Err(SearchError::Transcription(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_language_service_fails_both_ways() {
        let service = UnconfiguredLanguageService::new("no API key");

        let err = service.translate("namaste", None).await.unwrap_err();
        assert_eq!(err.kind(), "translation");

        let clip = AudioClip::new(vec![1, 2, 3], None);
        let err = service.transcribe(&clip).await.unwrap_err();
        assert_eq!(err.kind(), "transcription");
        assert!(err.to_string().contains("no API key"));
    }

    #[test]
    fn test_index_error_classification() {
        assert!(IndexError::Transient("timeout".into()).is_transient());
        assert!(!IndexError::Permanent("404".into()).is_transient());
    }
}

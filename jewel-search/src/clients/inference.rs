// Model Inference Server Client
//
// Concept: One HTTP client for every model the pipeline calls
// Endpoints:
// - POST {base}/embed/text   {"text"}                → {"embedding": [f32]}
// - POST {base}/embed/image  {"image_base64"}        → {"embedding": [f32]}
// - POST {base}/caption      {"image_base64"}        → {"description", "bbox"?}
//
// `bbox` is `[y_min, x_min, y_max, x_max]` in thousandths of the image size,
// locating the jewelry in the query image.
// - POST {base}/rerank       {"query", "document"}   → {"score"}
//
// The rerank document is the item's catalog description
// (`semantic_description`, falling back to `text_content`).

use crate::capabilities::{ImageDescriber, ImageEmbedder, RelevanceScorer, TextEmbedder};
use crate::clients::{body_excerpt, endpoint};
use crate::conflict::DESCRIPTION_KEY;
use crate::error::{SearchError, SearchResult};
use crate::types::{
    BoundingBox, Candidate, EmbeddingVector, ImageDescription, ImageRef, Query, VectorSource,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Fallback metadata attribute for the rerank document
const TEXT_CONTENT_KEY: &str = "text_content";

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    image_base64: String,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    document: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct CaptionResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bbox: Option<[f32; 4]>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    score: f32,
}

/// Inference server client (embeddings, captioning, reranking)
pub struct InferenceClient {
    client: Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
        }
    }

    /// POST `body` to `path` and decode the JSON reply; errors are plain messages
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, String>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(endpoint(&self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", path, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} returned {}: {}", path, status, body_excerpt(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| format!("{} returned malformed JSON: {}", path, e))
    }
}

/// Rerank document for a candidate: catalog description, else text content
pub fn rerank_document(candidate: &Candidate) -> Option<&str> {
    [DESCRIPTION_KEY, TEXT_CONTENT_KEY]
        .iter()
        .filter_map(|key| candidate.metadata.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

#[async_trait]
impl TextEmbedder for InferenceClient {
    async fn embed_text(&self, text: &str) -> SearchResult<EmbeddingVector> {
        let response: EmbeddingResponse = self
            .post_json("embed/text", &TextRequest { text })
            .await
            .map_err(SearchError::Embedding)?;
        Ok(EmbeddingVector::new(response.embedding, VectorSource::Text))
    }
}

#[async_trait]
impl ImageEmbedder for InferenceClient {
    async fn embed_image(&self, image: &ImageRef) -> SearchResult<EmbeddingVector> {
        let request = ImageRequest {
            image_base64: STANDARD.encode(image.bytes()),
        };
        let response: EmbeddingResponse = self
            .post_json("embed/image", &request)
            .await
            .map_err(SearchError::Embedding)?;
        Ok(EmbeddingVector::new(response.embedding, VectorSource::Image))
    }
}

#[async_trait]
impl ImageDescriber for InferenceClient {
    async fn describe_image(&self, image: &ImageRef) -> SearchResult<ImageDescription> {
        let request = ImageRequest {
            image_base64: STANDARD.encode(image.bytes()),
        };
        let response: CaptionResponse = self
            .post_json("caption", &request)
            .await
            .map_err(SearchError::Captioning)?;
        Ok(ImageDescription {
            caption: response.description.unwrap_or_default(),
            region: response.bbox.map(BoundingBox::from_array),
        })
    }
}

#[async_trait]
impl RelevanceScorer for InferenceClient {
    async fn rerank(&self, query: &Query, candidate: &Candidate) -> SearchResult<f32> {
        let scoring_error = |message: String| SearchError::Scoring {
            item_id: candidate.item_id.clone(),
            message,
        };

        let query_text = query
            .rerank_text()
            .ok_or_else(|| scoring_error("query has no text to rerank with".to_string()))?;
        let document = rerank_document(candidate)
            .ok_or_else(|| scoring_error("candidate has no description".to_string()))?;

        let response: RerankResponse = self
            .post_json(
                "rerank",
                &RerankRequest {
                    query: query_text,
                    document,
                },
            )
            .await
            .map_err(scoring_error)?;

        Ok(response.score)
    }
}

// Embedding Fuser
//
// Concept: Turn a normalized Query into the query vector(s) used for retrieval
// Synchronization: Accepts Query, returns Vec<EmbeddingVector> (one vector, or
// two when fusion is disabled for a hybrid query)
//
// Algorithm:
// 1. Embed every present component concurrently (text, image, caption)
//    (a timed-out embedding call is retried once; other failures are not)
// 2. Reject any vector of the wrong dimension or with non-finite values (fatal, no retry)
// 3. Single component: return it unchanged
// 4. Several components: weighted mean in canonical component order, then L2-normalize
//
// The image caption joins the fusion only when it does not contradict a facet
// value stated in the query text.

use crate::capabilities::{Capabilities, ImageEmbedder, TextEmbedder};
use crate::conflict::FacetVocabulary;
use crate::error::{SearchError, SearchResult};
use crate::types::{EmbeddingVector, ImageRef, Query, VectorSource};
use crate::utils::retry_on_timeout;
use jewel_common::config::FusionConfig;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per embedding call: the first call plus one retry on timeout
const MAX_EMBED_ATTEMPTS: u32 = 2;

/// Fusion component; the derive order is the canonical summation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Component {
    Text,
    Image,
    Caption,
}

/// One vector with its fusion weight
#[derive(Debug, Clone)]
pub struct WeightedVector {
    pub component: Component,
    pub vector: EmbeddingVector,
    pub weight: f32,
}

/// Weighted, L2-normalized mean of `components`
///
/// Components are summed in [`Component`] order, so the result is
/// bit-identical for any input order.
///
/// # Errors
/// `EmbeddingError` for no components, mismatched dimensions, non-positive
/// total weight, or a zero/non-finite result.
pub fn fuse(components: &[WeightedVector]) -> SearchResult<EmbeddingVector> {
    let mut ordered: Vec<&WeightedVector> = components.iter().collect();
    ordered.sort_by_key(|c| c.component);

    let first = ordered
        .first()
        .ok_or_else(|| SearchError::Embedding("nothing to fuse".to_string()))?;
    let dimension = first.vector.dimension();

    if let Some(bad) = ordered.iter().find(|c| c.vector.dimension() != dimension) {
        return Err(SearchError::Embedding(format!(
            "cannot fuse {:?} vector of dimension {} with dimension {}",
            bad.component,
            bad.vector.dimension(),
            dimension
        )));
    }

    let total_weight: f32 = ordered.iter().map(|c| c.weight).sum();
    if !(total_weight > 0.0) {
        return Err(SearchError::Embedding(format!(
            "fusion weights sum to {}",
            total_weight
        )));
    }

    let mut values = vec![0.0f32; dimension];
    for component in &ordered {
        for (acc, v) in values.iter_mut().zip(&component.vector.values) {
            *acc += v * component.weight;
        }
    }
    values.iter_mut().for_each(|v| *v /= total_weight);

    let fused = EmbeddingVector::new(values, VectorSource::Fused);
    let norm = fused.l2_norm();
    if !(norm.is_finite() && norm > 0.0) {
        return Err(SearchError::Embedding(format!(
            "fused vector has invalid norm {}",
            norm
        )));
    }

    Ok(EmbeddingVector::new(
        fused.values.into_iter().map(|v| v / norm).collect(),
        VectorSource::Fused,
    ))
}

/// Embedding fuser (second pipeline stage)
#[derive(Clone)]
pub struct EmbeddingFuser {
    text_embedder: Arc<dyn TextEmbedder>,
    image_embedder: Arc<dyn ImageEmbedder>,
    vocabulary: Arc<FacetVocabulary>,
    config: FusionConfig,
    dimension: usize,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl EmbeddingFuser {
    pub fn new(
        capabilities: &Capabilities,
        vocabulary: Arc<FacetVocabulary>,
        config: FusionConfig,
        dimension: usize,
        call_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            text_embedder: capabilities.text_embedder.clone(),
            image_embedder: capabilities.image_embedder.clone(),
            vocabulary,
            config,
            dimension,
            call_timeout,
            retry_backoff,
        }
    }

    /// Produce the query vector(s) for `query`
    ///
    /// # Errors
    /// `EmbeddingError` on wrong dimension, non-finite output, or a second timeout;
    /// `InvalidInput` if the query carries neither text nor image.
    pub async fn embed(&self, query: &Query) -> SearchResult<Vec<EmbeddingVector>> {
        let text = query.search_text();
        let image = query.image.as_ref();

        if text.is_none() && image.is_none() {
            return Err(SearchError::InvalidInput(
                "query has neither text nor image".to_string(),
            ));
        }

        if !self.config.enabled {
            let (text_vec, image_vec) =
                tokio::try_join!(self.maybe_text(text), self.maybe_image(image))?;
            let vectors: Vec<EmbeddingVector> = text_vec.into_iter().chain(image_vec).collect();
            tracing::debug!(vectors = vectors.len(), "Fusion disabled, using separate vectors");
            return Ok(vectors);
        }

        let caption = image
            .and(query.image_caption.as_deref())
            .filter(|_| self.config.caption_weight > 0.0)
            .filter(|caption| !self.caption_contradicts(text, caption));

        let (text_vec, image_vec, caption_vec) = tokio::try_join!(
            self.maybe_text(text),
            self.maybe_image(image),
            self.maybe_text(caption),
        )?;

        let mut components = Vec::with_capacity(3);
        if let Some(vector) = text_vec {
            components.push(WeightedVector {
                component: Component::Text,
                vector,
                weight: self.config.text_weight,
            });
        }
        if let Some(vector) = image_vec {
            components.push(WeightedVector {
                component: Component::Image,
                vector,
                weight: self.config.image_weight,
            });
        }
        if let Some(vector) = caption_vec {
            components.push(WeightedVector {
                component: Component::Caption,
                vector,
                weight: self.config.caption_weight,
            });
        }

        if components.len() == 1 {
            let only = components.remove(0);
            return Ok(vec![only.vector]);
        }

        tracing::debug!(
            components = ?components.iter().map(|c| c.component).collect::<Vec<_>>(),
            "Fusing query vectors"
        );
        Ok(vec![fuse(&components)?])
    }

    /// Whether the caption names a facet value other than the one requested in text
    pub fn caption_contradicts(&self, text: Option<&str>, caption: &str) -> bool {
        let Some(text) = text else {
            return false;
        };

        for facet in self.vocabulary.facet_names() {
            let requested = self.vocabulary.single_value(facet, text);
            let described = self.vocabulary.single_value(facet, caption);
            if let (Some(requested), Some(described)) = (requested, described) {
                if requested != described {
                    tracing::warn!(
                        facet,
                        requested = %requested,
                        described = %described,
                        "Caption contradicts query text, suppressing caption"
                    );
                    return true;
                }
            }
        }
        false
    }

    async fn maybe_text(&self, text: Option<&str>) -> SearchResult<Option<EmbeddingVector>> {
        let Some(text) = text else {
            return Ok(None);
        };

        let vector = retry_on_timeout(
            "text embedding",
            MAX_EMBED_ATTEMPTS,
            self.retry_backoff,
            self.call_timeout,
            || self.text_embedder.embed_text(text),
            || SearchError::Embedding("text embedding timed out".to_string()),
        )
        .await?;

        self.check(vector, VectorSource::Text).map(Some)
    }

    async fn maybe_image(&self, image: Option<&ImageRef>) -> SearchResult<Option<EmbeddingVector>> {
        let Some(image) = image else {
            return Ok(None);
        };

        let vector = retry_on_timeout(
            "image embedding",
            MAX_EMBED_ATTEMPTS,
            self.retry_backoff,
            self.call_timeout,
            || self.image_embedder.embed_image(image),
            || SearchError::Embedding("image embedding timed out".to_string()),
        )
        .await?;

        self.check(vector, VectorSource::Image).map(Some)
    }

    fn check(&self, vector: EmbeddingVector, source: VectorSource) -> SearchResult<EmbeddingVector> {
        if vector.dimension() != self.dimension {
            return Err(SearchError::Embedding(format!(
                "{:?} embedding has dimension {}, index expects {}",
                source,
                vector.dimension(),
                self.dimension
            )));
        }
        if !vector.is_finite() {
            return Err(SearchError::Embedding(format!(
                "{:?} embedding contains non-finite values",
                source
            )));
        }
        Ok(EmbeddingVector::new(vector.values, source))
    }
}

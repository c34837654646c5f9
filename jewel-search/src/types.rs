//! Shared Types and Data Contracts
//!
//! Explicit contracts between the pipeline stages. Each stage consumes the
//! previous stage's output by value and returns a new, annotated type;
//! nothing is mutated in place.
//!
//! ```text
//! QueryInput → Query → EmbeddingVector(s) → Candidate → RerankedCandidate
//!            → ResolvedCandidate → RankedResult
//! ```

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Query Input & Normalized Query
// ============================================================================

/// Raw request input before normalization
#[derive(Debug, Clone)]
pub enum QueryInput {
    Text(String),
    Image(Vec<u8>),
    Audio(AudioClip),
    /// Image plus text refinement ("this, but in silver")
    Hybrid { image: Vec<u8>, text: String },
}

/// Recorded audio query
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    /// Original file name, used for upload naming and MIME fallback
    pub file_name: Option<String>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, file_name: Option<String>) -> Self {
        Self { bytes, file_name }
    }

    /// MIME type from content sniffing, falling back to the file extension
    pub fn mime_type(&self) -> &'static str {
        if let Some(kind) = infer::get(&self.bytes) {
            if kind.matcher_type() == infer::MatcherType::Audio {
                return kind.mime_type();
            }
        }

        let ext = self
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("mp3") => "audio/mpeg",
            Some("wav") => "audio/wav",
            Some("m4a") => "audio/x-m4a",
            Some("ogg") => "audio/ogg",
            _ => "application/octet-stream",
        }
    }
}

/// Input modality of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Hybrid,
}

/// Opaque handle to query image bytes
///
/// Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageRef {
    bytes: Arc<[u8]>,
}

impl ImageRef {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Sniffed MIME type (None for unrecognized content)
    pub fn mime_type(&self) -> Option<&'static str> {
        infer::get(&self.bytes).map(|k| k.mime_type())
    }
}

impl std::fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRef")
            .field("len", &self.len())
            .field("mime", &self.mime_type())
            .finish()
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ImageRef", 2)?;
        state.serialize_field("bytes", &self.len())?;
        state.serialize_field("mime", &self.mime_type())?;
        state.end()
    }
}

/// Region of an image in thousandths of its height and width
///
/// Field order follows the captioning service's `[y_min, x_min, y_max, x_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub y_min: f32,
    pub x_min: f32,
    pub y_max: f32,
    pub x_max: f32,
}

impl BoundingBox {
    pub fn from_array([y_min, x_min, y_max, x_max]: [f32; 4]) -> Self {
        Self {
            y_min,
            x_min,
            y_max,
            x_max,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` inside a `width`×`height` image
    ///
    /// Coordinates are clamped to the image. None for a non-finite or empty box.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let coords = [self.y_min, self.x_min, self.y_max, self.x_max];
        if coords.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let scale = |value: f32, extent: u32| value.clamp(0.0, 1000.0) * extent as f32 / 1000.0;
        let x0 = scale(self.x_min, width).floor() as u32;
        let y0 = scale(self.y_min, height).floor() as u32;
        let x1 = (scale(self.x_max, width).ceil() as u32).min(width);
        let y1 = (scale(self.y_max, height).ceil() as u32).min(height);

        (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
    }
}

/// Captioning result for a query image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDescription {
    pub caption: String,
    /// Where the jewelry sits in the image, when the service located it
    pub region: Option<BoundingBox>,
}

/// Canonical query produced by the Modality Normalizer
///
/// Invariant: at least one of `translated_text` / `image` is present.
/// Immutable once normalization completes.
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    /// Text as supplied (or as transcribed, for audio)
    pub raw_text: Option<String>,
    /// Text in the working language (equals `raw_text` in degraded mode)
    pub translated_text: Option<String>,
    pub image: Option<ImageRef>,
    /// Description of the query image from the captioning service
    pub image_caption: Option<String>,
    pub modality: Modality,
    /// `Some("en")` for the English path, `Some("auto")` when routed to translation
    pub detected_language: Option<String>,
    /// Translation failed and the original text was retained
    pub degraded: bool,
}

impl Query {
    /// Text used for text embedding and facet extraction
    pub fn search_text(&self) -> Option<&str> {
        self.translated_text
            .as_deref()
            .or(self.raw_text.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Text sent to the reranker: query text, else the image caption
    pub fn rerank_text(&self) -> Option<&str> {
        self.search_text().or_else(|| {
            self.image_caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
        })
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// Source modality of an embedding vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSource {
    Text,
    Image,
    Fused,
}

/// Fixed-dimension query embedding
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub values: Vec<f32>,
    pub source: VectorSource,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>, source: VectorSource) -> Self {
        Self { values, source }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

// ============================================================================
// Candidates (Retriever → Reranker → Conflict Resolver → Assembler)
// ============================================================================

/// Catalog facet values keyed by attribute name
pub type Metadata = BTreeMap<String, String>;

/// First-stage retrieval hit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub item_id: String,
    /// Index similarity (higher = closer)
    pub coarse_score: f32,
    pub metadata: Metadata,
    /// Position in the merged retrieval order (0-based)
    pub retrieval_rank: usize,
}

/// Candidate with second-stage relevance score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub rerank_score: f32,
}

/// Disagreement between a requested and an observed facet value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictFlag {
    pub facet: String,
    /// Value requested in the query text
    pub expected: String,
    /// Value found in the candidate's metadata
    pub observed: String,
}

/// Candidate after conflict resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCandidate {
    #[serde(flatten)]
    pub reranked: RerankedCandidate,
    /// One flag per conflicting facet (empty = no conflict)
    pub conflicts: Vec<ConflictFlag>,
    /// Multiplier applied to the rerank score (1.0 = none)
    pub penalty: f32,
    pub final_score: f32,
}

impl ResolvedCandidate {
    pub fn item_id(&self) -> &str {
        &self.reranked.candidate.item_id
    }

    pub fn rerank_score(&self) -> f32 {
        self.reranked.rerank_score
    }

    pub fn metadata(&self) -> &Metadata {
        &self.reranked.candidate.metadata
    }

    /// First conflict flag, if any
    pub fn conflict_flag(&self) -> Option<&ConflictFlag> {
        self.conflicts.first()
    }

    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Final output: descending by `final_score`, ties by `item_id` ascending
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RankedResult {
    pub items: Vec<ResolvedCandidate>,
}

impl RankedResult {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedCandidate> {
        self.items.iter()
    }

    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|c| c.item_id()).collect()
    }
}

impl IntoIterator for RankedResult {
    type Item = ResolvedCandidate;
    type IntoIter = std::vec::IntoIter<ResolvedCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

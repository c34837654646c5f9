//! In-memory capabilities
//!
//! Deterministic stand-ins for the language service, inference server and
//! similarity index. Each mock counts its calls so tests can assert on which
//! services a request touched.

use async_trait::async_trait;
use jewel_search::capabilities::{
    Capabilities, ImageDescriber, ImageEmbedder, IndexError, IndexHit, RelevanceScorer,
    SimilarityIndex, TextEmbedder, Transcriber, Translator,
};
use jewel_search::types::{
    BoundingBox, Candidate, EmbeddingVector, ImageDescription, ImageRef, Metadata, VectorSource,
};
use jewel_search::{AudioClip, Query, SearchError, SearchResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic, strictly positive pseudo-embedding of `bytes`
pub fn embed_bytes(bytes: &[u8], dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|i| {
            let acc = bytes.iter().enumerate().fold(17u32, |acc, (j, b)| {
                acc.wrapping_mul(31)
                    .wrapping_add(u32::from(*b) * (i as u32 + j as u32 + 1))
            });
            (acc % 1000) as f32 / 1000.0 + 0.001
        })
        .collect()
}

/// Index hit with string metadata
pub fn hit(item_id: &str, score: f32, metadata: &[(&str, &str)]) -> IndexHit {
    IndexHit {
        item_id: item_id.to_string(),
        score,
        metadata: metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Metadata>(),
    }
}

/// Small necklace catalog: gold and silver variants of the same design
pub fn necklace_catalog() -> Vec<IndexHit> {
    vec![
        hit(
            "NK-GOLD-RUBY",
            0.91,
            &[
                ("material", "Gold"),
                ("category", "necklace"),
                ("stone", "ruby"),
                ("semantic_description", "Gold necklace set with rubies"),
            ],
        ),
        hit(
            "NK-SILVER-RUBY",
            0.89,
            &[
                ("material", "silver"),
                ("category", "necklace"),
                ("stone", "ruby"),
                ("semantic_description", "Sterling silver necklace with ruby drops"),
            ],
        ),
        hit(
            "NK-GOLD-PLAIN",
            0.80,
            &[
                ("material", "gold"),
                ("category", "necklace"),
                ("semantic_description", "Plain gold chain necklace"),
            ],
        ),
        hit(
            "NK-UNTAGGED",
            0.75,
            &[("semantic_description", "Layered necklace")],
        ),
        hit(
            "ER-GOLD-JHUMKA",
            0.60,
            &[
                ("material", "gold"),
                ("category", "earrings"),
                ("semantic_description", "Gold jhumka earrings"),
            ],
        ),
    ]
}

// ============================================================================
// Language service
// ============================================================================

/// Translator returning a fixed translation, or failing when none is set
pub struct MockTranslator {
    output: Option<String>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn returning(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, _text: &str, _source_lang: Option<&str>) -> SearchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output
            .clone()
            .ok_or_else(|| SearchError::Translation("translation service unavailable".to_string()))
    }
}

/// Transcriber returning a fixed transcript, or failing when none is set
pub struct MockTranscriber {
    transcript: Option<String>,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn returning(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            transcript: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &AudioClip) -> SearchResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| SearchError::Transcription("speech service returned 503".to_string()))
    }
}

// ============================================================================
// Inference server
// ============================================================================

/// Text embedder hashing the text into a fixed-size vector
pub struct MockTextEmbedder {
    dimension: usize,
    texts: Mutex<Vec<String>>,
    stall_first: Option<Duration>,
}

impl MockTextEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            texts: Mutex::new(Vec::new()),
            stall_first: None,
        }
    }

    /// Sleep for `delay` on the first call only
    pub fn stalling_first_call(mut self, delay: Duration) -> Self {
        self.stall_first = Some(delay);
        self
    }

    /// Every text embedded so far, in call order
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextEmbedder for MockTextEmbedder {
    async fn embed_text(&self, text: &str) -> SearchResult<EmbeddingVector> {
        let first_call = {
            let mut texts = self.texts.lock().unwrap();
            texts.push(text.to_string());
            texts.len() == 1
        };
        if let (true, Some(delay)) = (first_call, self.stall_first) {
            tokio::time::sleep(delay).await;
        }
        Ok(EmbeddingVector::new(
            embed_bytes(text.as_bytes(), self.dimension),
            VectorSource::Text,
        ))
    }
}

/// Image embedder hashing the image bytes into a fixed-size vector
pub struct MockImageEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    images: Mutex<Vec<ImageRef>>,
}

impl MockImageEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            images: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Images embedded so far, in call order
    pub fn images(&self) -> Vec<ImageRef> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageEmbedder for MockImageEmbedder {
    async fn embed_image(&self, image: &ImageRef) -> SearchResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.images.lock().unwrap().push(image.clone());
        Ok(EmbeddingVector::new(
            embed_bytes(image.bytes(), self.dimension),
            VectorSource::Image,
        ))
    }
}

/// Captioner returning the same description for every image
pub struct MockDescriber {
    description: ImageDescription,
}

impl MockDescriber {
    pub fn new(caption: &str) -> Self {
        Self {
            description: ImageDescription {
                caption: caption.to_string(),
                region: None,
            },
        }
    }

    /// Also report the jewelry at `[y_min, x_min, y_max, x_max]` (thousandths)
    pub fn with_region(mut self, region: [f32; 4]) -> Self {
        self.description.region = Some(BoundingBox::from_array(region));
        self
    }
}

#[async_trait]
impl ImageDescriber for MockDescriber {
    async fn describe_image(&self, _image: &ImageRef) -> SearchResult<ImageDescription> {
        Ok(self.description.clone())
    }
}

/// Relevance scorer with per-item scores and failures
///
/// Items without an explicit score are scored with their coarse score.
pub struct MockScorer {
    scores: HashMap<String, f32>,
    failing: HashSet<String>,
    stalling: Mutex<HashMap<String, Duration>>,
    queries: Mutex<Vec<String>>,
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            failing: HashSet::new(),
            stalling: Mutex::new(HashMap::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` the first time `item_id` is scored
    pub fn stalling_once_for(self, item_id: &str, delay: Duration) -> Self {
        self.stalling
            .lock()
            .unwrap()
            .insert(item_id.to_string(), delay);
        self
    }

    pub fn with_score(mut self, item_id: &str, score: f32) -> Self {
        self.scores.insert(item_id.to_string(), score);
        self
    }

    pub fn failing_for(mut self, item_id: &str) -> Self {
        self.failing.insert(item_id.to_string());
        self
    }

    /// Query texts seen, one per scored candidate
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelevanceScorer for MockScorer {
    async fn rerank(&self, query: &Query, candidate: &Candidate) -> SearchResult<f32> {
        self.queries
            .lock()
            .unwrap()
            .push(query.rerank_text().unwrap_or_default().to_string());

        let stall = self.stalling.lock().unwrap().remove(&candidate.item_id);
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&candidate.item_id) {
            return Err(SearchError::Scoring {
                item_id: candidate.item_id.clone(),
                message: "scoring service returned 500".to_string(),
            });
        }
        Ok(self
            .scores
            .get(&candidate.item_id)
            .copied()
            .unwrap_or(candidate.coarse_score))
    }
}

// ============================================================================
// Similarity index
// ============================================================================

/// Index returning a fixed hit list, after any scripted failures
pub struct MockIndex {
    hits: Vec<IndexHit>,
    failures: Mutex<VecDeque<IndexError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    vectors: Mutex<Vec<EmbeddingVector>>,
}

impl MockIndex {
    pub fn new(hits: Vec<IndexHit>) -> Self {
        Self {
            hits,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            vectors: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next calls with these errors, in order
    pub fn failing_with(self, failures: Vec<IndexError>) -> Self {
        *self.failures.lock().unwrap() = failures.into();
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query vectors received, in call order
    pub fn vectors(&self) -> Vec<EmbeddingVector> {
        self.vectors.lock().unwrap().clone()
    }
}

#[async_trait]
impl SimilarityIndex for MockIndex {
    async fn nearest_neighbors(
        &self,
        vector: &EmbeddingVector,
        top_n: usize,
    ) -> Result<Vec<IndexHit>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors.lock().unwrap().push(vector.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let mut hits = self.hits.clone();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_n);
        Ok(hits)
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Every mock, kept concrete so tests can inspect them after a search
pub struct TestServices {
    pub translator: Arc<MockTranslator>,
    pub transcriber: Arc<MockTranscriber>,
    pub text_embedder: Arc<MockTextEmbedder>,
    pub image_embedder: Arc<MockImageEmbedder>,
    pub describer: Option<Arc<MockDescriber>>,
    pub index: Arc<MockIndex>,
    pub scorer: Arc<MockScorer>,
}

impl TestServices {
    /// Healthy services over `hits`; translation is available, captioning is not
    pub fn new(hits: Vec<IndexHit>) -> Self {
        Self {
            translator: Arc::new(MockTranslator::returning("gold necklace")),
            transcriber: Arc::new(MockTranscriber::returning("gold jhumka")),
            text_embedder: Arc::new(MockTextEmbedder::new(super::TEST_DIMENSION)),
            image_embedder: Arc::new(MockImageEmbedder::new(super::TEST_DIMENSION)),
            describer: None,
            index: Arc::new(MockIndex::new(hits)),
            scorer: Arc::new(MockScorer::new()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        let describer: Option<Arc<dyn ImageDescriber>> = self
            .describer
            .clone()
            .map(|d| -> Arc<dyn ImageDescriber> { d });

        Capabilities {
            translator: self.translator.clone(),
            transcriber: self.transcriber.clone(),
            text_embedder: self.text_embedder.clone(),
            image_embedder: self.image_embedder.clone(),
            describer,
            index: self.index.clone(),
            scorer: self.scorer.clone(),
        }
    }
}

//! Candidate Retriever
//!
//! Nearest-neighbor lookups against the similarity index, one per query
//! vector, run concurrently. Each lookup gets a single retry with backoff on
//! transient failure (timeouts count as transient); permanent failures and a
//! second transient failure surface as `RetrievalError`.
//!
//! Results from several vectors (fusion disabled) are merged by union,
//! keeping the higher coarse score for duplicate item ids.

use crate::capabilities::{IndexError, IndexHit, SimilarityIndex};
use crate::error::{SearchError, SearchResult};
use crate::types::{Candidate, EmbeddingVector};
use crate::utils::{retry_transient, with_timeout};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Attempts per lookup: the first call plus one retry
const MAX_LOOKUP_ATTEMPTS: u32 = 2;

#[derive(Clone)]
pub struct CandidateRetriever {
    index: Arc<dyn SimilarityIndex>,
    top_n: usize,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl CandidateRetriever {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        top_n: usize,
        call_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            index,
            top_n,
            call_timeout,
            retry_backoff,
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Top-N candidates for the given query vectors
    ///
    /// Output is sorted by coarse score (descending, ties by item id),
    /// holds at most `top_n` entries, and never repeats an item id.
    pub async fn retrieve(&self, vectors: &[EmbeddingVector]) -> SearchResult<Vec<Candidate>> {
        if vectors.is_empty() {
            return Err(SearchError::InvalidInput("no query vector to search with".to_string()));
        }

        let hit_lists = try_join_all(vectors.iter().map(|v| self.lookup(v))).await?;
        let candidates = merge_hits(hit_lists, self.top_n);

        tracing::debug!(
            lookups = vectors.len(),
            candidates = candidates.len(),
            "Retrieval merged"
        );
        Ok(candidates)
    }

    async fn lookup(&self, vector: &EmbeddingVector) -> SearchResult<Vec<IndexHit>> {
        let index = self.index.as_ref();
        let (top_n, call_timeout) = (self.top_n, self.call_timeout);

        retry_transient(
            "index lookup",
            MAX_LOOKUP_ATTEMPTS,
            self.retry_backoff,
            IndexError::is_transient,
            move || {
                with_timeout(call_timeout, index.nearest_neighbors(vector, top_n), || {
                    IndexError::Transient("index lookup timed out".to_string())
                })
            },
        )
        .await
        .map_err(|e| SearchError::Retrieval(e.to_string()))
    }
}

/// Union of hit lists, best score per item, sorted and truncated
///
/// Hits with a non-finite score are discarded.
pub fn merge_hits(hit_lists: Vec<Vec<IndexHit>>, top_n: usize) -> Vec<Candidate> {
    let mut best: HashMap<String, IndexHit> = HashMap::new();

    for hit in hit_lists.into_iter().flatten() {
        if !hit.score.is_finite() {
            tracing::warn!(item_id = %hit.item_id, "Discarding index hit with non-finite score");
            continue;
        }

        match best.get(&hit.item_id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.item_id.clone(), hit);
            }
        }
    }

    let mut hits: Vec<IndexHit> = best.into_values().collect();
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    hits.truncate(top_n);

    hits.into_iter()
        .enumerate()
        .map(|(rank, hit)| Candidate {
            item_id: hit.item_id,
            coarse_score: hit.score,
            metadata: hit.metadata,
            retrieval_rank: rank,
        })
        .collect()
}

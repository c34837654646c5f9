//! Reranker
//!
//! Second-stage scoring of the bounded top-N set. Candidates are scored
//! independently over a bounded worker pool (`buffer_unordered`), so
//! completion order is arbitrary; the output is sorted by rerank score with
//! retrieval rank as the secondary key.
//!
//! A scoring call that times out is retried once. A failed score, a second
//! timeout, or a non-finite score drops that candidate only.

use crate::capabilities::RelevanceScorer;
use crate::error::SearchError;
use crate::types::{Candidate, Query, RerankedCandidate};
use crate::utils::retry_on_timeout;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Attempts per scoring call: the first call plus one retry on timeout
const MAX_SCORE_ATTEMPTS: u32 = 2;

/// Reranked batch plus bookkeeping for the search report
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub candidates: Vec<RerankedCandidate>,
    /// Candidates removed because scoring failed
    pub dropped: usize,
    /// Coarse scores were carried over without calling the scorer
    pub bypassed: bool,
}

#[derive(Clone)]
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    concurrency: usize,
    call_timeout: Duration,
    retry_backoff: Duration,
    enabled: bool,
}

impl Reranker {
    pub fn new(
        scorer: Arc<dyn RelevanceScorer>,
        concurrency: usize,
        call_timeout: Duration,
        retry_backoff: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            scorer,
            concurrency: concurrency.max(1),
            call_timeout,
            retry_backoff,
            enabled,
        }
    }

    /// Score every candidate against `query`
    ///
    /// Never fails as a whole. The output set equals the input set minus
    /// candidates whose scoring failed.
    pub async fn rerank(&self, query: &Query, candidates: Vec<Candidate>) -> RerankOutcome {
        if !self.enabled || query.rerank_text().is_none() {
            tracing::debug!(
                enabled = self.enabled,
                "Rerank bypassed, carrying coarse scores"
            );
            return RerankOutcome {
                candidates: bypass(candidates),
                dropped: 0,
                bypassed: true,
            };
        }

        let scorer = self.scorer.as_ref();
        let (call_timeout, retry_backoff) = (self.call_timeout, self.retry_backoff);

        // **Per-candidate error isolation** over a bounded pool of in-flight calls
        let scored: Vec<(Candidate, Result<f32, SearchError>)> = stream::iter(candidates)
            .map(|candidate| async move {
                let item_id = candidate.item_id.clone();
                let result = retry_on_timeout(
                    "candidate scoring",
                    MAX_SCORE_ATTEMPTS,
                    retry_backoff,
                    call_timeout,
                    || scorer.rerank(query, &candidate),
                    || SearchError::Scoring {
                        item_id,
                        message: "scoring timed out".to_string(),
                    },
                )
                .await;
                (candidate, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = RerankOutcome::default();

        for (candidate, result) in scored {
            match result {
                Ok(score) if score.is_finite() => {
                    tracing::debug!(
                        item_id = %candidate.item_id,
                        coarse_score = candidate.coarse_score,
                        rerank_score = score,
                        "Candidate scored"
                    );
                    outcome.candidates.push(RerankedCandidate {
                        candidate,
                        rerank_score: score,
                    });
                }
                Ok(score) => {
                    tracing::warn!(
                        item_id = %candidate.item_id,
                        score,
                        "Dropping candidate: non-finite rerank score"
                    );
                    outcome.dropped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        item_id = %candidate.item_id,
                        error = %e,
                        "Dropping candidate: scoring failed"
                    );
                    outcome.dropped += 1;
                }
            }
        }

        sort_by_rerank(&mut outcome.candidates);
        outcome
    }
}

/// Rerank scores copied from coarse scores, in retrieval order
fn bypass(candidates: Vec<Candidate>) -> Vec<RerankedCandidate> {
    let mut reranked: Vec<RerankedCandidate> = candidates
        .into_iter()
        .map(|candidate| RerankedCandidate {
            rerank_score: candidate.coarse_score,
            candidate,
        })
        .collect();
    sort_by_rerank(&mut reranked);
    reranked
}

/// Descending rerank score; equal scores keep retrieval order
fn sort_by_rerank(candidates: &mut [RerankedCandidate]) {
    candidates.sort_by(|a, b| {
        b.rerank_score
            .total_cmp(&a.rerank_score)
            .then_with(|| a.candidate.retrieval_rank.cmp(&b.candidate.retrieval_rank))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, coarse: f32, rank: usize) -> Candidate {
        Candidate {
            item_id: id.to_string(),
            coarse_score: coarse,
            metadata: Default::default(),
            retrieval_rank: rank,
        }
    }

    fn reranked(id: &str, score: f32, rank: usize) -> RerankedCandidate {
        RerankedCandidate {
            candidate: candidate(id, 0.0, rank),
            rerank_score: score,
        }
    }

    #[test]
    fn test_equal_scores_keep_retrieval_order() {
        let mut batch = vec![
            reranked("late", 0.5, 7),
            reranked("top", 0.9, 3),
            reranked("early", 0.5, 1),
        ];
        sort_by_rerank(&mut batch);

        let ids: Vec<&str> = batch.iter().map(|c| c.candidate.item_id.as_str()).collect();
        assert_eq!(ids, vec!["top", "early", "late"]);
    }

    #[test]
    fn test_bypass_carries_coarse_score() {
        let out = bypass(vec![candidate("a", 0.3, 1), candidate("b", 0.7, 0)]);
        assert_eq!(out[0].candidate.item_id, "b");
        assert_eq!(out[0].rerank_score, 0.7);
        assert_eq!(out[1].rerank_score, 0.3);
    }
}

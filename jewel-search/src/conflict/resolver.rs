// Conflict Resolver
//
// Concept: Compare facet values requested in the query text against the values
// each candidate actually carries, and penalize disagreement
// Synchronization: Accepts RerankedCandidate batch, outputs ResolvedCandidate batch
//
// Precedence (textual intent is authoritative):
// 1. No conflicting facet: final_score = rerank_score, bit-for-bit
// 2. k conflicting facets: score multiplied by penalty^k (compounds per facet)
// 3. Conflicting candidates are kept unless a hard-filter threshold is configured

use crate::conflict::vocabulary::{FacetRequirement, FacetVocabulary};
use crate::types::{ConflictFlag, Metadata, RerankedCandidate, ResolvedCandidate};
use jewel_common::config::{ConflictConfig, MIN_HARD_FILTER_CONFLICTS};
use std::sync::Arc;

/// Metadata attribute holding the catalog-time vision description of an item
pub const DESCRIPTION_KEY: &str = "semantic_description";

/// Penalty and filtering policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConflictPolicy {
    /// Applied once per conflicting facet, in (0, 1]
    pub penalty_multiplier: f32,
    /// Drop candidates with at least this many conflicting facets
    pub hard_filter_min_conflicts: Option<usize>,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            penalty_multiplier: 0.5,
            hard_filter_min_conflicts: None,
        }
    }
}

impl From<&ConflictConfig> for ConflictPolicy {
    fn from(config: &ConflictConfig) -> Self {
        Self {
            penalty_multiplier: config.penalty_multiplier,
            hard_filter_min_conflicts: config.hard_filter_min_conflicts,
        }
    }
}

impl ConflictPolicy {
    /// Penalty multiplier and final score for `conflicts` conflicting facets
    ///
    /// Positive scores are scaled by `penalty^k`. Negative scores (raw
    /// cross-encoder logits) move down by `|score| * (1 - penalty^k)`, so a
    /// penalized score never exceeds the unpenalized one.
    pub fn apply(&self, rerank_score: f32, conflicts: usize) -> (f32, f32) {
        if conflicts == 0 {
            return (1.0, rerank_score);
        }

        let exponent = i32::try_from(conflicts).unwrap_or(i32::MAX);
        let penalty = self.penalty_multiplier.powi(exponent);
        let final_score = if rerank_score >= 0.0 {
            rerank_score * penalty
        } else {
            rerank_score - rerank_score.abs() * (1.0 - penalty)
        };

        (penalty, final_score)
    }

    /// Whether a candidate with `conflicts` conflicting facets is dropped
    ///
    /// A single conflict is never enough, whatever the threshold says.
    pub fn filters(&self, conflicts: usize) -> bool {
        matches!(
            self.hard_filter_min_conflicts,
            Some(min) if conflicts >= min.max(MIN_HARD_FILTER_CONFLICTS)
        )
    }
}

/// Output of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub candidates: Vec<ResolvedCandidate>,
    /// Candidates removed by the hard filter
    pub filtered: usize,
}

/// Conflict resolver (pure computation, no external calls)
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    vocabulary: Arc<FacetVocabulary>,
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub fn new(vocabulary: Arc<FacetVocabulary>, policy: ConflictPolicy) -> Self {
        Self { vocabulary, policy }
    }

    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Resolve a reranked batch against the query text
    ///
    /// # Algorithm
    /// 1. Extract requested facet values from the query text (once per batch)
    /// 2. For each candidate, compare every requested facet against its observed values
    /// 3. Apply the compounding penalty; drop if the hard filter applies
    ///
    /// Candidate order is preserved; sorting is the assembler's job.
    pub fn resolve(&self, query_text: Option<&str>, candidates: Vec<RerankedCandidate>) -> Resolution {
        let requested = query_text
            .map(|t| self.vocabulary.requirements(t))
            .unwrap_or_default();

        if !requested.is_empty() {
            tracing::debug!(
                requested = ?requested.iter().map(|r| format!("{}={}", r.facet, r.value)).collect::<Vec<_>>(),
                "Explicit facet requirements"
            );
        }

        let mut resolution = Resolution::default();

        for reranked in candidates {
            let conflicts = self.detect(&requested, &reranked.candidate.metadata);

            if self.policy.filters(conflicts.len()) {
                tracing::debug!(
                    item_id = %reranked.candidate.item_id,
                    conflicts = conflicts.len(),
                    "Candidate removed by hard filter"
                );
                resolution.filtered += 1;
                continue;
            }

            let (penalty, final_score) = self.policy.apply(reranked.rerank_score, conflicts.len());

            if !conflicts.is_empty() {
                tracing::debug!(
                    item_id = %reranked.candidate.item_id,
                    conflicts = conflicts.len(),
                    rerank_score = reranked.rerank_score,
                    final_score,
                    "Facet conflict penalized"
                );
            }

            resolution.candidates.push(ResolvedCandidate {
                reranked,
                conflicts,
                penalty,
                final_score,
            });
        }

        resolution
    }

    /// Conflict flags for one candidate's metadata
    pub fn detect(&self, requested: &[FacetRequirement], metadata: &Metadata) -> Vec<ConflictFlag> {
        requested
            .iter()
            .filter_map(|req| {
                let (raw, observed) = self.observed_values(&req.facet, metadata)?;
                if observed.contains(&req.value) {
                    None
                } else {
                    Some(ConflictFlag {
                        facet: req.facet.clone(),
                        expected: req.value.clone(),
                        observed: raw,
                    })
                }
            })
            .collect()
    }

    /// Observed values of `facet` as (display text, canonical set)
    ///
    /// Metadata naming several values ("gold, silver", "Gold and Silver") is a
    /// set of alternatives: every known value in every comma-separated member
    /// is observed, and a member naming none contributes its own text.
    /// Without the metadata attribute, falls back to the single value named
    /// in the item description. None means nothing observable: no conflict
    /// possible.
    fn observed_values(&self, facet: &str, metadata: &Metadata) -> Option<(String, Vec<String>)> {
        let key = self.vocabulary.metadata_key(facet)?;

        if let Some(raw) = lookup(metadata, key).filter(|v| !v.trim().is_empty()) {
            let mut observed: Vec<String> = Vec::new();
            for member in raw.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                let known = self.vocabulary.values_in(facet, member);
                if known.is_empty() {
                    observed.push(self.vocabulary.canonicalize(facet, member));
                } else {
                    observed.extend(known);
                }
            }
            return Some((raw.trim().to_string(), observed));
        }

        let description = lookup(metadata, DESCRIPTION_KEY)?;
        self.vocabulary
            .single_value(facet, description)
            .map(|value| (value.clone(), vec![value]))
    }
}

/// Metadata lookup: exact key first, then case-insensitive
fn lookup<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(key)
        .or_else(|| {
            metadata
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

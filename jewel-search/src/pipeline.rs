//! Search Pipeline
//!
//! Runs one request through every stage:
//!
//! ```text
//! Normalizer → Fuser → Retriever → Reranker → Conflict Resolver → Assembler
//! ```
//!
//! The pipeline owns no per-request state; concurrent searches share only the
//! read-only capabilities and configuration. Each stage races the request's
//! [`CancellationToken`], and dropping the search future drops every
//! in-flight external call with it.

use crate::assembler::assemble;
use crate::capabilities::Capabilities;
use crate::conflict::{ConflictPolicy, ConflictResolver, FacetVocabulary};
use crate::error::{SearchError, SearchResult};
use crate::fusion::EmbeddingFuser;
use crate::normalizer::ModalityNormalizer;
use crate::reranker::Reranker;
use crate::retriever::CandidateRetriever;
use crate::types::{Query, QueryInput, RankedResult};
use chrono::{DateTime, Utc};
use jewel_common::config::TomlConfig;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Wall-clock time spent per stage (milliseconds)
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub normalize_ms: u64,
    pub embed_ms: u64,
    pub retrieve_ms: u64,
    pub rerank_ms: u64,
    pub resolve_ms: u64,
    pub total_ms: u64,
}

/// Ranked answer plus a report of how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub query: Query,
    pub results: RankedResult,
    /// Candidates returned by the index
    pub retrieved: usize,
    /// Candidates lost to scoring failures
    pub dropped: usize,
    /// Candidates removed by the conflict hard filter
    pub filtered: usize,
    /// Query ran on untranslated text
    pub degraded: bool,
    pub rerank_bypassed: bool,
    pub timings: StageTimings,
}

/// Multimodal search pipeline, built once and shared by all requests
#[derive(Clone)]
pub struct SearchPipeline {
    normalizer: ModalityNormalizer,
    fuser: EmbeddingFuser,
    retriever: CandidateRetriever,
    reranker: Reranker,
    resolver: ConflictResolver,
    result_count: usize,
}

impl SearchPipeline {
    /// Wire the stages from capabilities and configuration
    pub fn new(capabilities: Capabilities, config: &TomlConfig) -> Self {
        let call_timeout = Duration::from_millis(config.services.call_timeout_ms);
        let retry_backoff = Duration::from_millis(config.search.retry_backoff_ms);
        let vocabulary = Arc::new(FacetVocabulary::from_specs(&config.conflict.facets));

        Self {
            normalizer: ModalityNormalizer::new(
                &capabilities,
                &config.language,
                call_timeout,
                retry_backoff,
            ),
            fuser: EmbeddingFuser::new(
                &capabilities,
                vocabulary.clone(),
                config.fusion.clone(),
                config.search.embedding_dimension,
                call_timeout,
                retry_backoff,
            ),
            retriever: CandidateRetriever::new(
                capabilities.index.clone(),
                config.search.top_n,
                call_timeout,
                retry_backoff,
            ),
            reranker: Reranker::new(
                capabilities.scorer.clone(),
                config.rerank.concurrency,
                call_timeout,
                retry_backoff,
                config.rerank.enabled,
            ),
            resolver: ConflictResolver::new(vocabulary, ConflictPolicy::from(&config.conflict)),
            result_count: config.search.result_count,
        }
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Run a search to completion
    pub async fn search(&self, input: QueryInput) -> SearchResult<SearchOutcome> {
        self.search_with_cancel(input, &CancellationToken::new()).await
    }

    /// Run a search that stops with `SearchError::Cancelled` when `cancel` fires
    ///
    /// # Errors
    /// Fatal errors only: `InvalidInput`, `Transcription`, `Embedding`,
    /// `Retrieval`, `Cancelled`. Translation and per-candidate scoring
    /// failures are absorbed and reported through the outcome.
    pub async fn search_with_cancel(
        &self,
        input: QueryInput,
        cancel: &CancellationToken,
    ) -> SearchResult<SearchOutcome> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("search", request_id = %request_id);

        let result = self.run(request_id, input, cancel).instrument(span.clone()).await;

        if let Err(e) = &result {
            let _enter = span.enter();
            match e {
                SearchError::Cancelled => tracing::info!("Search cancelled by caller"),
                _ => tracing::error!(kind = e.kind(), error = %e, "Search failed"),
            }
        }
        result
    }

    async fn run(
        &self,
        request_id: Uuid,
        input: QueryInput,
        cancel: &CancellationToken,
    ) -> SearchResult<SearchOutcome> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut timings = StageTimings::default();

        // Stage 1: normalize
        let stage_start = Instant::now();
        let query = race(cancel, self.normalizer.normalize(input)).await??;
        timings.normalize_ms = elapsed_ms(stage_start);
        tracing::info!(
            stage = "normalize",
            modality = ?query.modality,
            degraded = query.degraded,
            elapsed_ms = timings.normalize_ms,
            "Query normalized"
        );

        // Stage 2: embed (and fuse)
        let stage_start = Instant::now();
        let vectors = race(cancel, self.fuser.embed(&query)).await??;
        timings.embed_ms = elapsed_ms(stage_start);
        tracing::info!(
            stage = "embed",
            vectors = vectors.len(),
            sources = ?vectors.iter().map(|v| v.source).collect::<Vec<_>>(),
            elapsed_ms = timings.embed_ms,
            "Query embedded"
        );

        // Stage 3: retrieve
        let stage_start = Instant::now();
        let candidates = race(cancel, self.retriever.retrieve(&vectors)).await??;
        let retrieved = candidates.len();
        timings.retrieve_ms = elapsed_ms(stage_start);
        tracing::info!(
            stage = "retrieve",
            candidates = retrieved,
            elapsed_ms = timings.retrieve_ms,
            "Candidates retrieved"
        );

        // Stage 4: rerank
        let stage_start = Instant::now();
        let reranked = race(cancel, self.reranker.rerank(&query, candidates)).await?;
        timings.rerank_ms = elapsed_ms(stage_start);
        if reranked.dropped > 0 {
            tracing::warn!(
                stage = "rerank",
                dropped = reranked.dropped,
                "Candidates dropped after scoring failures"
            );
        }
        tracing::info!(
            stage = "rerank",
            scored = reranked.candidates.len(),
            bypassed = reranked.bypassed,
            elapsed_ms = timings.rerank_ms,
            "Candidates reranked"
        );

        // Stage 5: resolve conflicts (pure computation)
        let stage_start = Instant::now();
        let resolution = self.resolver.resolve(query.search_text(), reranked.candidates);
        timings.resolve_ms = elapsed_ms(stage_start);
        tracing::info!(
            stage = "resolve",
            conflicted = resolution.candidates.iter().filter(|c| c.has_conflict()).count(),
            filtered = resolution.filtered,
            elapsed_ms = timings.resolve_ms,
            "Conflicts resolved"
        );

        // Stage 6: assemble
        let results = assemble(resolution.candidates, self.result_count);
        timings.total_ms = elapsed_ms(start);
        tracing::info!(
            results = results.len(),
            total_ms = timings.total_ms,
            "Search complete"
        );

        Ok(SearchOutcome {
            request_id,
            started_at,
            degraded: query.degraded,
            query,
            results,
            retrieved,
            dropped: reranked.dropped,
            filtered: resolution.filtered,
            rerank_bypassed: reranked.bypassed,
            timings,
        })
    }
}

/// Await `future` unless `cancel` fires first
async fn race<T>(cancel: &CancellationToken, future: impl Future<Output = T>) -> SearchResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SearchError::Cancelled),
        output = future => Ok(output),
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

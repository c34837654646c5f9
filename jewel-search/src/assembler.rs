//! Result Assembler
//!
//! Final ordering: `final_score` descending, ties by `item_id` ascending,
//! truncated to the requested result count. `f32::total_cmp` keeps the
//! order total even for values the comparison operators cannot rank.

use crate::types::{RankedResult, ResolvedCandidate};

/// Sort, truncate and wrap resolved candidates
pub fn assemble(mut candidates: Vec<ResolvedCandidate>, result_count: usize) -> RankedResult {
    candidates.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.item_id().cmp(b.item_id()))
    });
    candidates.truncate(result_count);

    RankedResult { items: candidates }
}

//! Candidate retrieval (C5): tenant-scoped FTS + recency + importance +
//! tag overlap over the Effective View, with deterministic tie-breaks and
//! floating-fact suppression.

use amc_core::{Channel, EffectiveChunk, Scope};
use amc_storage::{Store, StorageError};

use crate::effective_view::apply_edits_to_chunk;

/// Fixed scoring weights. Tested, not user-configurable — changing these
/// changes ranking for every tenant at once.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub fts: f64,
    pub importance: f64,
    pub recency: f64,
    pub tag_overlap: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { fts: 0.4, importance: 0.3, recency: 0.2, tag_overlap: 0.1 }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalQuery<'a> {
    pub tenant_id: &'a str,
    pub session_id: &'a str,
    pub channel: Channel,
    pub intent_tags: &'a [String],
    pub query_text: Option<&'a str>,
    pub scope: Option<Scope>,
    pub subject: Option<(&'a str, &'a str)>,
    pub project_id: Option<&'a str>,
    pub include_quarantined: bool,
    pub max_candidates: u32,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub effective: EffectiveChunk,
    pub score: f64,
}

/// Exponential recency decay: score 1.0 at `ts == now`, halving every
/// `half_life_seconds`.
pub fn recency_decay(ts: i64, now_ts: i64, half_life_seconds: u64) -> f64 {
    if half_life_seconds == 0 {
        return if ts >= now_ts { 1.0 } else { 0.0 };
    }
    let age = (now_ts - ts).max(0) as f64;
    0.5_f64.powf(age / half_life_seconds as f64)
}

fn tag_overlap(intent_tags: &[String], candidate_tags: &[String]) -> f64 {
    if intent_tags.is_empty() || candidate_tags.is_empty() {
        return 0.0;
    }
    let matches = intent_tags.iter().filter(|tag| candidate_tags.contains(tag)).count();
    matches as f64 / intent_tags.len() as f64
}

/// Retrieves a ranked candidate pool for one query. `fts_rank` comes back
/// from storage as position within the FTS-matched set (best match first);
/// it's converted to a `[0,1]` score here since SQLite FTS5's bm25 isn't
/// exposed through the `Store` primitive.
pub fn retrieve(
    store: &Store,
    query: &RetrievalQuery<'_>,
    weights: ScoringWeights,
    now_ts: i64,
    recency_half_life_seconds: u64,
) -> Result<Vec<ScoredChunk>, StorageError> {
    let pool_limit = query.max_candidates.max(1);
    let candidates = store.search_chunks(
        query.tenant_id,
        query.query_text,
        Some(query.session_id),
        query.scope,
        query.subject,
        query.project_id,
        pool_limit,
    )?;

    let has_query = query.query_text.is_some();
    let pool_size = candidates.len().max(1);

    let mut scored: Vec<ScoredChunk> = Vec::new();
    for (rank, chunk) in candidates.into_iter().enumerate() {
        let edits = store.approved_edits_for_target(query.tenant_id, amc_core::TargetType::Chunk, &chunk.chunk_id)?;
        let Some(effective) = apply_edits_to_chunk(&chunk, &edits, query.channel, query.include_quarantined) else {
            continue;
        };

        let fts_rank = if has_query { 1.0 - (rank as f64 / pool_size as f64) } else { 0.0 };
        let fts_weight = if has_query { weights.fts } else { 0.0 };
        let recency = recency_decay(effective.chunk.ts, now_ts, recency_half_life_seconds);
        let tags = tag_overlap(query.intent_tags, &effective.chunk.tags);

        let score = fts_weight * fts_rank
            + weights.importance * effective.chunk.importance
            + weights.recency * recency
            + weights.tag_overlap * tags;

        scored.push(ScoredChunk { effective, score });
    }

    rank_and_suppress_floating_summaries(scored)
}

/// Deterministic ordering (score desc, then importance desc, then ts desc,
/// then lexicographic chunk_id), followed by the floating-fact suppression
/// rule: an ungrounded summary chunk never outranks a grounded item
/// covering the same candidate pool.
fn rank_and_suppress_floating_summaries(mut scored: Vec<ScoredChunk>) -> Result<Vec<ScoredChunk>, StorageError> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.effective.chunk.importance.partial_cmp(&a.effective.chunk.importance).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.effective.chunk.ts.cmp(&a.effective.chunk.ts))
            .then_with(|| a.effective.chunk.chunk_id.cmp(&b.effective.chunk.chunk_id))
    });

    let has_grounded = scored.iter().any(|candidate| !candidate.effective.chunk.is_floating_summary());
    if !has_grounded {
        return Ok(scored);
    }

    let (grounded, floating): (Vec<_>, Vec<_>) =
        scored.into_iter().partition(|candidate| !candidate.effective.chunk.is_floating_summary());
    let mut ordered = grounded;
    ordered.extend(floating);
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_decay_halves_at_half_life() {
        let decay = recency_decay(0, 86_400, 86_400);
        assert!((decay - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recency_decay_is_one_at_present() {
        assert_eq!(recency_decay(1000, 1000, 3600), 1.0);
    }

    #[test]
    fn tag_overlap_is_fraction_of_intent_tags_matched() {
        let intent = vec!["architecture".to_string(), "storage".to_string()];
        let candidate = vec!["architecture".to_string()];
        assert_eq!(tag_overlap(&intent, &candidate), 0.5);
    }

    #[test]
    fn tag_overlap_is_zero_with_no_intent_tags() {
        assert_eq!(tag_overlap(&[], &["anything".to_string()]), 0.0);
    }
}

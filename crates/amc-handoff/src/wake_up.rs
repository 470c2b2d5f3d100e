//! Stratified wake-up: assembles the four handoff layers a reconnecting
//! agent can ask for, cheapest first. Each layer is independently
//! requestable so a caller on a tight budget can ask for just `Recent`.

use amc_core::{CoreError, Handoff, Reflection, WakeUpLayer, WakeUpRequest, WakeUpResult};
use amc_storage::Store;

const DEFAULT_RECENT_COUNT: u32 = 3;
const PROGRESSIVE_LIMIT_FACTOR: u32 = 2;

pub fn handoff_token_estimate(handoff: &Handoff) -> u32 {
    [
        &handoff.experienced,
        &handoff.noticed,
        &handoff.learned,
        &handoff.story,
        &handoff.becoming,
        &handoff.remember,
    ]
    .iter()
    .map(|text| amc_core::tokens::estimate(text))
    .sum()
}

/// Assembles the requested layers. Absence of prior history is not an
/// error: `first_session` is set and every other layer comes back empty.
pub fn wake_up_stratified(store: &Store, tenant_id: &str, request: WakeUpRequest, now_ts: i64) -> Result<WakeUpResult, CoreError> {
    if request.with_whom.trim().is_empty() {
        return Err(CoreError::InvalidArgument("with_whom must not be empty".to_string()));
    }

    let last = store.last_handoff(tenant_id, &request.with_whom)?;
    let first_session = last.is_none();
    if first_session {
        return Ok(WakeUpResult {
            first_session: true,
            ..Default::default()
        });
    }

    let recent_count = request.recent_count.unwrap_or(DEFAULT_RECENT_COUNT);
    let mut result = WakeUpResult {
        first_session: false,
        ..Default::default()
    };
    let mut included_tokens = 0u32;

    if request.layers.contains(&WakeUpLayer::Metadata) {
        result.metadata = store.handoff_metadata(tenant_id, &request.with_whom)?;
    }

    if request.layers.contains(&WakeUpLayer::Reflection) {
        result.reflection = Some(store.reflection(tenant_id, &request.with_whom)?.unwrap_or_else(|| Reflection {
            available: false,
            reason: Some("no reflection has been generated yet for this relationship".to_string()),
            insights: Vec::new(),
            source_handoff_ids: Vec::new(),
            generated_at: None,
        }));
    }

    if request.layers.contains(&WakeUpLayer::Recent) {
        result.recent = store.recent_handoffs(tenant_id, &request.with_whom, recent_count)?;
        included_tokens += result.recent.iter().map(handoff_token_estimate).sum::<u32>();
    }

    if request.layers.contains(&WakeUpLayer::Progressive) {
        let topic = request.topic.clone().unwrap_or_default();
        if !topic.trim().is_empty() {
            let exclude_ids: Vec<String> = result.recent.iter().map(|h| h.handoff_id.clone()).collect();
            let limit = recent_count.saturating_mul(PROGRESSIVE_LIMIT_FACTOR).max(1);
            result.progressive = store.progressive_handoffs(tenant_id, &request.with_whom, &topic, &exclude_ids, limit)?;
            included_tokens += result.progressive.iter().map(handoff_token_estimate).sum::<u32>();
        }
    }

    let all_sessions = store.recent_handoffs(tenant_id, &request.with_whom, u32::MAX)?;
    let full_text_tokens: u32 = all_sessions.iter().map(handoff_token_estimate).sum();

    result.estimated_tokens = included_tokens;
    result.compression_ratio = if full_text_tokens == 0 {
        1.0
    } else {
        included_tokens as f64 / full_text_tokens as f64
    };

    let _ = now_ts;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::create_handoff;
    use amc_core::CompressionLevel;

    fn input(with_whom: &str, significance: f64, becoming: &str) -> amc_core::HandoffInput {
        amc_core::HandoffInput {
            with_whom: with_whom.to_string(),
            session_id: "s1".to_string(),
            experienced: "worked on retrieval scoring".to_string(),
            noticed: "floating summaries were outranking grounded decisions".to_string(),
            learned: "partition grounded ahead of floating after sorting".to_string(),
            story: "a focused debugging session".to_string(),
            becoming: becoming.to_string(),
            remember: "keep the tie-break deterministic".to_string(),
            significance,
            tags: vec!["retrieval".to_string()],
            compression_level: CompressionLevel::Full,
            influenced_by: None,
        }
    }

    #[test]
    fn first_session_has_no_prior_history() {
        let store = Store::open_in_memory().expect("open store");
        let request = WakeUpRequest {
            with_whom: "agent-a".to_string(),
            layers: vec![WakeUpLayer::Recent],
            recent_count: None,
            topic: None,
        };
        let result = wake_up_stratified(&store, "t1", request, 5000).unwrap();
        assert!(result.first_session);
        assert!(result.recent.is_empty());
    }

    #[test]
    fn recent_layer_returns_requested_count() {
        let store = Store::open_in_memory().expect("open store");
        for i in 0..5 {
            create_handoff(&store, "t1", input("agent-a", 0.5, "iteration"), 1000 + i).unwrap();
        }
        let request = WakeUpRequest {
            with_whom: "agent-a".to_string(),
            layers: vec![WakeUpLayer::Recent],
            recent_count: Some(2),
            topic: None,
        };
        let result = wake_up_stratified(&store, "t1", request, 6000).unwrap();
        assert_eq!(result.recent.len(), 2);
        assert!(result.estimated_tokens > 0);
    }

    #[test]
    fn reflection_layer_is_unavailable_when_never_generated() {
        let store = Store::open_in_memory().expect("open store");
        create_handoff(&store, "t1", input("agent-a", 0.5, "iteration"), 1000).unwrap();
        let request = WakeUpRequest {
            with_whom: "agent-a".to_string(),
            layers: vec![WakeUpLayer::Reflection],
            recent_count: None,
            topic: None,
        };
        let result = wake_up_stratified(&store, "t1", request, 2000).unwrap();
        let reflection = result.reflection.expect("reflection layer present");
        assert!(!reflection.available);
        assert!(reflection.reason.is_some());
    }

    #[test]
    fn progressive_layer_excludes_handoffs_already_in_recent() {
        let store = Store::open_in_memory().expect("open store");
        create_handoff(&store, "t1", input("agent-a", 0.5, "older topic work"), 1000).unwrap();
        let recent_one = create_handoff(&store, "t1", input("agent-a", 0.5, "older topic work"), 2000).unwrap();
        let request = WakeUpRequest {
            with_whom: "agent-a".to_string(),
            layers: vec![WakeUpLayer::Recent, WakeUpLayer::Progressive],
            recent_count: Some(1),
            topic: Some("topic".to_string()),
        };
        let result = wake_up_stratified(&store, "t1", request, 3000).unwrap();
        assert_eq!(result.recent.len(), 1);
        assert_eq!(result.recent[0].handoff_id, recent_one.handoff_id);
        assert!(result.progressive.iter().all(|h| h.handoff_id != recent_one.handoff_id));
    }

    #[test]
    fn empty_with_whom_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let request = WakeUpRequest {
            with_whom: String::new(),
            layers: vec![WakeUpLayer::Recent],
            recent_count: None,
            topic: None,
        };
        assert!(matches!(wake_up_stratified(&store, "t1", request, 1000), Err(CoreError::InvalidArgument(_))));
    }
}

//! Reflection synthesis: once a relationship has accumulated enough
//! unconsolidated handoffs, fold them into a handful of durable insights.

use amc_core::CoreError;
use amc_storage::Store;

/// Minimum unconsolidated handoffs before a reflection is (re)generated.
pub const REFLECTION_THRESHOLD: usize = 5;
const MIN_INSIGHTS: usize = 3;
const MAX_INSIGHTS: usize = 5;

/// Synthesizes insights for `(tenant, with_whom)` if at least
/// `REFLECTION_THRESHOLD` handoffs are unconsolidated, persists them, and
/// marks the source handoffs consolidated. Returns `false` if the
/// threshold hasn't been reached (idempotent no-op).
pub fn generate_reflection(store: &Store, tenant_id: &str, with_whom: &str, now_ts: i64) -> Result<bool, CoreError> {
    let unconsolidated = store.unconsolidated_handoffs(tenant_id, with_whom)?;
    if unconsolidated.len() < REFLECTION_THRESHOLD {
        return Ok(false);
    }

    let mut by_significance = unconsolidated.clone();
    by_significance.sort_by(|a, b| b.significance.partial_cmp(&a.significance).unwrap_or(std::cmp::Ordering::Equal));

    let mut insights = Vec::new();
    for handoff in by_significance.iter().take(MAX_INSIGHTS) {
        if !handoff.becoming.trim().is_empty() {
            insights.push(format!("{}: {}", handoff.with_whom, handoff.becoming.trim()));
        } else if !handoff.learned.trim().is_empty() {
            insights.push(format!("{}: {}", handoff.with_whom, handoff.learned.trim()));
        }
        if insights.len() >= MAX_INSIGHTS {
            break;
        }
    }
    if insights.len() < MIN_INSIGHTS {
        let mut tag_counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
        for handoff in &unconsolidated {
            for tag in &handoff.tags {
                *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        let mut tags: Vec<_> = tag_counts.into_iter().collect();
        tags.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        for (tag, count) in tags {
            if insights.len() >= MIN_INSIGHTS {
                break;
            }
            insights.push(format!("recurring theme: {tag} ({count} sessions)"));
        }
    }
    if insights.is_empty() {
        insights.push(format!("{} sessions recorded, no standout theme yet", unconsolidated.len()));
    }

    let source_ids: Vec<String> = unconsolidated.iter().map(|h| h.handoff_id.clone()).collect();
    store.upsert_reflection(tenant_id, with_whom, &insights, &source_ids, now_ts)?;
    store.mark_handoffs_consolidated(tenant_id, &source_ids)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{CompressionLevel, HandoffInput};

    fn make_store() -> Store {
        Store::open_in_memory().expect("open store")
    }

    fn input(becoming: &str, significance: f64) -> HandoffInput {
        HandoffInput {
            with_whom: "agent-1".to_string(),
            session_id: "s1".to_string(),
            experienced: "did stuff".to_string(),
            noticed: "noted stuff".to_string(),
            learned: "learned stuff".to_string(),
            story: "a story".to_string(),
            becoming: becoming.to_string(),
            remember: "remember this".to_string(),
            significance,
            tags: vec!["refactor".to_string()],
            compression_level: CompressionLevel::Full,
            influenced_by: None,
        }
    }

    #[test]
    fn below_threshold_is_a_no_op() {
        let store = make_store();
        for i in 0..3 {
            crate::create_handoff(&store, "t1", input(&format!("becoming {i}"), 0.5), 1000 + i).unwrap();
        }
        let generated = generate_reflection(&store, "t1", "agent-1", 2000).unwrap();
        assert!(!generated);
        assert!(store.reflection("t1", "agent-1").unwrap().is_none());
    }

    #[test]
    fn at_threshold_generates_and_consolidates() {
        let store = make_store();
        for i in 0..5 {
            crate::create_handoff(&store, "t1", input(&format!("becoming {i}"), 0.5 + i as f64 * 0.01), 1000 + i).unwrap();
        }
        let generated = generate_reflection(&store, "t1", "agent-1", 2000).unwrap();
        assert!(generated);
        let reflection = store.reflection("t1", "agent-1").unwrap().unwrap();
        assert!(reflection.insights.len() >= MIN_INSIGHTS);
        assert_eq!(reflection.source_handoff_ids.len(), 5);
        assert!(store.unconsolidated_handoffs("t1", "agent-1").unwrap().is_empty());
    }

    #[test]
    fn rerunning_after_consolidation_is_idempotent() {
        let store = make_store();
        for i in 0..5 {
            crate::create_handoff(&store, "t1", input(&format!("becoming {i}"), 0.5), 1000 + i).unwrap();
        }
        generate_reflection(&store, "t1", "agent-1", 2000).unwrap();
        let generated_again = generate_reflection(&store, "t1", "agent-1", 3000).unwrap();
        assert!(!generated_again);
    }
}

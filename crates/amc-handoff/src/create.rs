//! Immutable handoff writes. Every insert is a trigger-equivalent write-time
//! refresh of that `(tenant, with_whom)` pair's aggregate metadata row —
//! SQLite has no aggregate-maintaining triggers rich enough for this, so
//! the refresh happens here in application code, the same way task
//! `blocking` links are maintained in `amc-storage`.

use amc_core::{ids, CoreError, Handoff, HandoffInput, HandoffMetadata};
use amc_storage::Store;

const HIGH_SIGNIFICANCE_THRESHOLD: f64 = 0.7;

pub fn create_handoff(store: &Store, tenant_id: &str, input: HandoffInput, ts: i64) -> Result<Handoff, CoreError> {
    let handoff = Handoff {
        handoff_id: ids::new_handoff_id(),
        tenant_id: tenant_id.to_string(),
        with_whom: input.with_whom,
        session_id: input.session_id,
        ts,
        experienced: input.experienced,
        noticed: input.noticed,
        learned: input.learned,
        story: input.story,
        becoming: input.becoming,
        remember: input.remember,
        significance: input.significance.clamp(0.0, 1.0),
        tags: input.tags,
        compression_level: input.compression_level,
        influenced_by: input.influenced_by,
    };
    store.insert_handoff(&handoff)?;
    refresh_metadata(store, tenant_id, &handoff.with_whom)?;
    Ok(handoff)
}

/// Recomputes `(tenant, with_whom)`'s aggregate row from every handoff on
/// file, then `INSERT ... ON CONFLICT UPDATE`s it. Cheap enough to run on
/// every write since `recent_handoffs` with a generous cap covers the
/// history; the consolidation worker re-runs this same refresh on a
/// schedule so a missed write-time update self-heals.
pub fn refresh_metadata(store: &Store, tenant_id: &str, with_whom: &str) -> Result<(), CoreError> {
    let all = store.recent_handoffs(tenant_id, with_whom, u32::MAX)?;
    if all.is_empty() {
        return Ok(());
    }

    let session_count = all.len() as u32;
    let first_session = all.iter().map(|h| h.ts).min();
    let last_session = all.iter().map(|h| h.ts).max();
    let significance_avg = all.iter().map(|h| h.significance).sum::<f64>() / all.len() as f64;
    let high_significance_count = all.iter().filter(|h| h.significance >= HIGH_SIGNIFICANCE_THRESHOLD).count() as u32;

    let mut all_tags: Vec<String> = Vec::new();
    for handoff in &all {
        for tag in &handoff.tags {
            if !all_tags.contains(tag) {
                all_tags.push(tag.clone());
            }
        }
    }

    let mut key_people: Vec<String> = vec![with_whom.to_string()];
    key_people.sort();

    let metadata = HandoffMetadata {
        session_count,
        first_session,
        last_session,
        significance_avg,
        key_people,
        all_tags,
        high_significance_count,
    };
    store.upsert_handoff_metadata(tenant_id, with_whom, &metadata)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::CompressionLevel;

    fn sample_input(with_whom: &str, significance: f64) -> HandoffInput {
        HandoffInput {
            with_whom: with_whom.to_string(),
            session_id: "s1".to_string(),
            experienced: "shipped the ingest pipeline".to_string(),
            noticed: "tests were flaky under load".to_string(),
            learned: "sqlite needs WAL mode under concurrent writers".to_string(),
            story: "a long session of debugging".to_string(),
            becoming: "more careful about transactions".to_string(),
            remember: "always wrap multi-table writes".to_string(),
            significance,
            tags: vec!["storage".to_string()],
            compression_level: CompressionLevel::Full,
            influenced_by: None,
        }
    }

    #[test]
    fn create_handoff_refreshes_metadata() {
        let store = Store::open_in_memory().expect("open store");
        create_handoff(&store, "t1", sample_input("agent-a", 0.9), 1000).unwrap();
        create_handoff(&store, "t1", sample_input("agent-a", 0.3), 2000).unwrap();

        let metadata = store.handoff_metadata("t1", "agent-a").unwrap().expect("metadata present");
        assert_eq!(metadata.session_count, 2);
        assert_eq!(metadata.first_session, Some(1000));
        assert_eq!(metadata.last_session, Some(2000));
        assert_eq!(metadata.high_significance_count, 1);
        assert!((metadata.significance_avg - 0.6).abs() < 1e-9);
    }

    #[test]
    fn significance_is_clamped_to_unit_interval() {
        let store = Store::open_in_memory().expect("open store");
        let handoff = create_handoff(&store, "t1", sample_input("agent-a", 1.5), 1000).unwrap();
        assert_eq!(handoff.significance, 1.0);
    }
}

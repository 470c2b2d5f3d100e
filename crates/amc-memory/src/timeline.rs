//! Timeline lookup: the chunks neighboring a given chunk within a window,
//! through the same Effective View every other read goes through.

use amc_core::{Channel, CoreError, EffectiveChunk, TargetType};
use amc_storage::Store;
use serde::Serialize;

use crate::effective_view::apply_edits_to_chunk;

#[derive(Debug, Clone, Serialize)]
pub struct TimelineNeighbor {
    pub effective: EffectiveChunk,
    pub distance_seconds: i64,
}

/// Other chunks in `chunk_id`'s session within `window_seconds` of its
/// timestamp, sorted by absolute distance ascending (closest first).
pub fn get_timeline(
    store: &Store,
    tenant_id: &str,
    chunk_id: &str,
    window_seconds: i64,
    channel: Channel,
    include_quarantined: bool,
) -> Result<Vec<TimelineNeighbor>, CoreError> {
    let center = store
        .get_chunks_by_ids(tenant_id, std::slice::from_ref(&chunk_id.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::NotFound(format!("chunk {chunk_id} not found")))?;

    let window_micros = window_seconds.saturating_mul(1_000_000);
    let candidates = store.recent_chunks(tenant_id, &center.session_id, u32::MAX)?;

    let mut neighbors = Vec::new();
    for candidate in candidates {
        if candidate.chunk_id == center.chunk_id {
            continue;
        }
        let delta = candidate.ts - center.ts;
        if delta.abs() > window_micros {
            continue;
        }
        let edits = store.approved_edits_for_target(tenant_id, TargetType::Chunk, &candidate.chunk_id)?;
        if let Some(effective) = apply_edits_to_chunk(&candidate, &edits, channel, include_quarantined) {
            neighbors.push(TimelineNeighbor { effective, distance_seconds: delta / 1_000_000 });
        }
    }
    neighbors.sort_by_key(|n| n.distance_seconds.abs());
    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{Channel, Chunk, EventKind, Sensitivity};

    fn chunk(id: &str, session: &str, ts: i64) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            tenant_id: "t1".to_string(),
            event_id: format!("evt_{id}"),
            session_id: session.to_string(),
            ts,
            kind: EventKind::Message,
            channel: Channel::Private,
            sensitivity: Sensitivity::None,
            tags: Vec::new(),
            text: format!("text for {id}"),
            token_est: 5,
            importance: 0.5,
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
            refs: vec![format!("evt_{id}")],
        }
    }

    #[test]
    fn neighbors_within_window_are_returned_sorted_by_distance() {
        let store = Store::open_in_memory().expect("open store");
        store.insert_chunks(&[chunk("c1", "s1", 0), chunk("c2", "s1", 5_000_000), chunk("c3", "s1", 20_000_000)]).unwrap();

        let neighbors = get_timeline(&store, "t1", "c1", 10, Channel::Private, false).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].effective.chunk.chunk_id, "c2");
        assert_eq!(neighbors[0].distance_seconds, 5);
    }

    #[test]
    fn unknown_chunk_is_not_found() {
        let store = Store::open_in_memory().expect("open store");
        let result = get_timeline(&store, "t1", "missing", 10, Channel::Private, false);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}

//! Sticky invariant extraction: pattern cues over the recent window that
//! identify context no eviction pass is allowed to drop.

use amc_core::{AcbItem, EffectiveChunk, SourceKind};

pub const PRIORITY_SAFETY: u32 = 1000;
pub const PRIORITY_USER_CORRECTION: u32 = 900;
pub const PRIORITY_HARD_CONSTRAINT: u32 = 800;
pub const PRIORITY_BLOCKING_ERROR: u32 = 700;

const SAFETY_CUES: &[&str] = &["must not", "never do", "unsafe", "do not delete", "danger"];
const USER_CORRECTION_CUES: &[&str] = &["actually,", "actually ", "wait,", "wait -", "no, i meant", "correction:"];
const HARD_CONSTRAINT_CUES: &[&str] = &["must ", "required", "mandatory", "hard constraint"];
const BLOCKING_ERROR_CUES: &[&str] = &["blocked", "blocking error", "failed to", "cannot proceed"];

fn cue_priority(text: &str) -> Option<u32> {
    let lowered = text.to_lowercase();
    if SAFETY_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(PRIORITY_SAFETY);
    }
    if USER_CORRECTION_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(PRIORITY_USER_CORRECTION);
    }
    if HARD_CONSTRAINT_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(PRIORITY_HARD_CONSTRAINT);
    }
    if BLOCKING_ERROR_CUES.iter().any(|cue| lowered.contains(cue)) {
        return Some(PRIORITY_BLOCKING_ERROR);
    }
    None
}

/// Scans the recent window (already effective-view-filtered) for cue
/// matches, highest priority first, ties broken by recency (input order,
/// since `recent_window` is already ts desc).
pub fn extract_sticky_invariants(recent_window: &[EffectiveChunk]) -> Vec<AcbItem> {
    let mut items: Vec<AcbItem> = recent_window
        .iter()
        .filter_map(|effective| {
            let priority = cue_priority(&effective.chunk.text)?;
            Some(AcbItem {
                text: effective.chunk.text.clone(),
                token_est: effective.chunk.token_est,
                refs: effective.chunk.refs.clone(),
                source_kind: SourceKind::Chunk,
                priority,
            })
        })
        .collect();
    items.sort_by(|a, b| b.priority.cmp(&a.priority));
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::Chunk;

    fn effective_chunk(text: &str) -> EffectiveChunk {
        EffectiveChunk {
            chunk: Chunk {
                chunk_id: "c1".to_string(),
                tenant_id: "t1".to_string(),
                event_id: "e1".to_string(),
                session_id: "s1".to_string(),
                ts: 1000,
                kind: amc_core::EventKind::Message,
                channel: amc_core::Channel::Private,
                sensitivity: amc_core::Sensitivity::None,
                tags: Vec::new(),
                text: text.to_string(),
                token_est: 10,
                importance: 0.5,
                scope: None,
                subject_type: None,
                subject_id: None,
                project_id: None,
                refs: vec!["e1".to_string()],
            },
            is_quarantined: false,
            blocked_channels: Vec::new(),
            edits_applied: 0,
        }
    }

    #[test]
    fn safety_cue_outranks_blocking_error_cue() {
        let window = vec![
            effective_chunk("tool call failed to connect"),
            effective_chunk("you must not delete the production database"),
        ];
        let items = extract_sticky_invariants(&window);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].priority, PRIORITY_SAFETY);
    }

    #[test]
    fn plain_chat_yields_no_sticky_items() {
        let window = vec![effective_chunk("just chatting about the weather")];
        assert!(extract_sticky_invariants(&window).is_empty());
    }

    #[test]
    fn user_correction_cue_is_detected() {
        let window = vec![effective_chunk("Actually, wait - use postgres instead of sqlite")];
        let items = extract_sticky_invariants(&window);
        assert_eq!(items[0].priority, PRIORITY_USER_CORRECTION);
    }
}

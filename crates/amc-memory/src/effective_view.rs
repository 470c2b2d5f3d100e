//! Read-time projection of base `Chunk`/`Decision` rows with their
//! approved `MemoryEdit`s applied. Base rows in storage are never mutated;
//! this module recomputes the merged view on every read.

use amc_core::{Channel, Chunk, Decision, EditOp, EffectiveChunk, EffectiveDecision, MemoryEdit};

/// Applies approved edits to a base chunk in fixed precedence order:
/// `retract` short-circuits everything else; `block` hides the row for a
/// matching reader channel; `quarantine` hides it unless the caller opted
/// in; the latest `amend` replaces text/importance; every `attenuate`
/// then adjusts importance on top, summed in `applied_at` order.
pub fn apply_edits_to_chunk(
    base: &Chunk,
    edits: &[MemoryEdit],
    channel: Channel,
    include_quarantined: bool,
) -> Option<EffectiveChunk> {
    if edits.iter().any(|edit| edit.op == EditOp::Retract) {
        return None;
    }

    let mut blocked_channels: Vec<Channel> = Vec::new();
    for edit in edits.iter().filter(|edit| edit.op == EditOp::Block) {
        if let Some(channel_str) = &edit.patch.channel {
            if let Ok(blocked) = channel_str.parse::<Channel>() {
                if !blocked_channels.contains(&blocked) {
                    blocked_channels.push(blocked);
                }
            }
        }
    }
    if blocked_channels.contains(&channel) {
        return None;
    }

    let is_quarantined = edits.iter().any(|edit| edit.op == EditOp::Quarantine);
    if is_quarantined && !include_quarantined {
        return None;
    }

    let mut chunk = base.clone();

    if let Some(amend) = latest_amend(edits) {
        if let Some(new_text) = &amend.patch.text {
            chunk.text = new_text.clone();
        }
        if let Some(new_importance) = amend.patch.importance {
            chunk.importance = new_importance;
        }
    }

    let mut attenuate_edits: Vec<&MemoryEdit> = edits.iter().filter(|edit| edit.op == EditOp::Attenuate).collect();
    attenuate_edits.sort_by_key(|edit| edit.applied_at.unwrap_or(i64::MIN));
    for edit in attenuate_edits {
        chunk.importance = match (edit.patch.importance, edit.patch.importance_delta) {
            (Some(absolute), _) => absolute,
            (None, Some(delta)) => chunk.importance + delta,
            (None, None) => chunk.importance,
        }
        .clamp(0.0, 1.0);
    }

    let edits_applied = edits.len() as u32;
    Some(EffectiveChunk { chunk, is_quarantined, blocked_channels, edits_applied })
}

/// Same precedence rules as `apply_edits_to_chunk`, restricted to the
/// fields a `Decision` actually has: no channel/importance, so only
/// `retract`, `quarantine`, and `amend` (onto `decision.decision`) apply.
pub fn apply_edits_to_decision(base: &Decision, edits: &[MemoryEdit], include_quarantined: bool) -> Option<EffectiveDecision> {
    if edits.iter().any(|edit| edit.op == EditOp::Retract) {
        return None;
    }

    let is_quarantined = edits.iter().any(|edit| edit.op == EditOp::Quarantine);
    if is_quarantined && !include_quarantined {
        return None;
    }

    let mut decision = base.clone();
    if let Some(amend) = latest_amend(edits) {
        if let Some(new_text) = &amend.patch.text {
            decision.decision = new_text.clone();
        }
    }

    Some(EffectiveDecision { decision, is_quarantined })
}

fn latest_amend(edits: &[MemoryEdit]) -> Option<&MemoryEdit> {
    edits
        .iter()
        .filter(|edit| edit.op == EditOp::Amend)
        .max_by_key(|edit| edit.applied_at.unwrap_or(i64::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{EditPatch, EditStatus, Scope, Sensitivity, TargetType};

    fn sample_chunk() -> Chunk {
        Chunk {
            chunk_id: "chk_1".to_string(),
            tenant_id: "t1".to_string(),
            event_id: "evt_1".to_string(),
            session_id: "s1".to_string(),
            ts: 1000,
            kind: amc_core::EventKind::Message,
            channel: Channel::Private,
            sensitivity: Sensitivity::None,
            tags: Vec::new(),
            text: "original text".to_string(),
            token_est: 3,
            importance: 0.5,
            scope: Some(Scope::Session),
            subject_type: None,
            subject_id: None,
            project_id: None,
            refs: vec!["evt_1".to_string()],
        }
    }

    fn sample_edit(op: EditOp, applied_at: Option<i64>, patch: EditPatch) -> MemoryEdit {
        MemoryEdit {
            edit_id: format!("edit_{applied_at:?}_{op:?}"),
            tenant_id: "t1".to_string(),
            ts: applied_at.unwrap_or(0),
            target_type: TargetType::Chunk,
            target_id: "chk_1".to_string(),
            op,
            reason: "test".to_string(),
            proposed_by: "agent-1".to_string(),
            approved_by: Some("agent-2".to_string()),
            status: EditStatus::Approved,
            patch,
            applied_at,
        }
    }

    #[test]
    fn retract_hides_row_entirely() {
        let chunk = sample_chunk();
        let edits = vec![sample_edit(EditOp::Retract, Some(10), EditPatch::default())];
        assert!(apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).is_none());
    }

    #[test]
    fn quarantine_hidden_unless_opted_in() {
        let chunk = sample_chunk();
        let edits = vec![sample_edit(EditOp::Quarantine, Some(10), EditPatch::default())];
        assert!(apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).is_none());
        let visible = apply_edits_to_chunk(&chunk, &edits, Channel::Private, true).unwrap();
        assert!(visible.is_quarantined);
    }

    #[test]
    fn block_hides_only_for_matching_channel() {
        let chunk = sample_chunk();
        let edits = vec![sample_edit(
            EditOp::Block,
            Some(10),
            EditPatch { channel: Some("public".to_string()), ..Default::default() },
        )];
        assert!(apply_edits_to_chunk(&chunk, &edits, Channel::Public, false).is_none());
        assert!(apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).is_some());
    }

    #[test]
    fn latest_amend_wins_over_earlier_amend() {
        let chunk = sample_chunk();
        let edits = vec![
            sample_edit(EditOp::Amend, Some(10), EditPatch { text: Some("first edit".to_string()), ..Default::default() }),
            sample_edit(EditOp::Amend, Some(20), EditPatch { text: Some("second edit".to_string()), ..Default::default() }),
        ];
        let effective = apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).unwrap();
        assert_eq!(effective.chunk.text, "second edit");
    }

    #[test]
    fn attenuate_edits_sum_and_clamp() {
        let chunk = sample_chunk();
        let edits = vec![
            sample_edit(EditOp::Attenuate, Some(10), EditPatch { importance_delta: Some(0.3), ..Default::default() }),
            sample_edit(EditOp::Attenuate, Some(20), EditPatch { importance_delta: Some(0.5), ..Default::default() }),
        ];
        let effective = apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).unwrap();
        assert_eq!(effective.chunk.importance, 1.0);
    }

    #[test]
    fn retract_outranks_amend_and_attenuate() {
        let chunk = sample_chunk();
        let edits = vec![
            sample_edit(EditOp::Amend, Some(5), EditPatch { text: Some("should not appear".to_string()), ..Default::default() }),
            sample_edit(EditOp::Retract, Some(10), EditPatch::default()),
        ];
        assert!(apply_edits_to_chunk(&chunk, &edits, Channel::Private, false).is_none());
    }

    #[test]
    fn no_edits_returns_base_row_unchanged() {
        let chunk = sample_chunk();
        let effective = apply_edits_to_chunk(&chunk, &[], Channel::Private, false).unwrap();
        assert_eq!(effective.chunk.text, "original text");
        assert_eq!(effective.edits_applied, 0);
        assert!(!effective.is_quarantined);
    }
}

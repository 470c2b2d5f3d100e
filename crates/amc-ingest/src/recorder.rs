//! Validates, persists, and chunks incoming events in one transaction,
//! then writes the audit trail entry for the attempt.

use amc_core::event::MAX_EVENT_CONTENT_BYTES;
use amc_core::hashing::canonical_payload_hash;
use amc_core::{ids, ActorRef, AuditLogEntry, AuditOutcome, CoreError, Event, EventInput};
use amc_storage::{Store, StorageError};
use serde::Serialize;
use tracing::{info, warn};

use crate::chunker;

#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub event_id: String,
    pub ts: i64,
    pub chunk_ids: Vec<String>,
}

/// Fields the idempotency hash is computed over; excludes `event_id`/`ts`
/// so a retried submission that only differs by assigned id/time still
/// collides with the original.
#[derive(Serialize)]
struct DedupKey<'a> {
    session_id: &'a str,
    channel: &'static str,
    actor_type: &'static str,
    actor_id: &'a str,
    kind: &'static str,
    content: &'a serde_json::Value,
}

fn dedup_key(event: &Event) -> DedupKey<'_> {
    DedupKey {
        session_id: &event.session_id,
        channel: event.channel.as_str(),
        actor_type: event.actor.actor_type.as_str(),
        actor_id: &event.actor.id,
        kind: event.kind.as_str(),
        content: &event.content,
    }
}

fn validate(input: &EventInput, tenant_id: &str, store: &Store) -> Result<(), CoreError> {
    if input.session_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument("session_id must not be empty".to_string()));
    }
    let size = serde_json::to_vec(&input.content)
        .map_err(|err| CoreError::InvalidArgument(format!("content is not serializable: {err}")))?
        .len();
    if size > MAX_EVENT_CONTENT_BYTES {
        return Err(CoreError::InvalidArgument(format!(
            "content is {size} bytes, exceeds max {MAX_EVENT_CONTENT_BYTES}"
        )));
    }
    for ref_id in &input.refs {
        match store.get_event(tenant_id, ref_id) {
            Ok(_) => {}
            Err(StorageError::NotFound) => {
                return Err(CoreError::IntegrityError(format!("refs entry {ref_id} is not a known event for this tenant")))
            }
            Err(other) => return Err(other.into()),
        }
    }
    Ok(())
}

fn log_audit(store: &Store, tenant_id: &str, actor: &ActorRef, op: &str, target: &str, outcome: AuditOutcome, ts: i64) {
    let entry = AuditLogEntry {
        audit_id: ids::new_audit_id(),
        tenant_id: tenant_id.to_string(),
        actor_id: actor.id.clone(),
        op: op.to_string(),
        target: target.to_string(),
        outcome,
        ts,
        ip: None,
        metadata: serde_json::json!({}),
    };
    if let Err(err) = store.insert_audit_log(&entry) {
        warn!(error = %err, "record_event: failed to write audit log entry");
    }
}

/// Records one event: assigns identity, validates, persists the event and
/// its derived chunks in a single transaction, then writes the audit log.
/// Re-submitting a payload already seen for this `(tenant, session)` is a
/// no-op that returns the original event's id and chunk ids rather than
/// erroring.
pub fn record_event(
    store: &Store,
    tenant_id: &str,
    actor: ActorRef,
    input: EventInput,
    now_ts: i64,
) -> Result<RecordedEvent, CoreError> {
    if let Err(err) = validate(&input, tenant_id, store) {
        log_audit(store, tenant_id, &actor, "record_event", "(unassigned)", AuditOutcome::Failure, now_ts);
        return Err(err);
    }

    let event = Event {
        event_id: ids::new_event_id(),
        tenant_id: tenant_id.to_string(),
        session_id: input.session_id,
        ts: now_ts,
        channel: input.channel,
        actor: actor.clone(),
        kind: input.kind,
        sensitivity: input.sensitivity,
        tags: input.tags,
        content: input.content,
        refs: input.refs,
        scope: input.scope,
        subject_type: input.subject_type,
        subject_id: input.subject_id,
        project_id: input.project_id,
    };

    let content_hash =
        canonical_payload_hash(&dedup_key(&event)).map_err(|err| CoreError::internal(err.to_string()))?;

    if let Some(existing) = store.find_event_by_hash(tenant_id, &event.session_id, &content_hash)? {
        let chunk_ids = store
            .chunks_for_event(tenant_id, &existing.event_id)?
            .into_iter()
            .map(|chunk| chunk.chunk_id)
            .collect();
        info!(event_id = %existing.event_id, "record_event: duplicate submission, returning prior result");
        return Ok(RecordedEvent { event_id: existing.event_id, ts: existing.ts, chunk_ids });
    }

    let chunks = chunker::derive_chunks(&event);
    let chunk_ids: Vec<String> = chunks.iter().map(|chunk| chunk.chunk_id.clone()).collect();

    let result: Result<(), StorageError> = store.transaction(|_tx| {
        let inserted = store.insert_event(&event, &content_hash)?;
        if !inserted {
            return Err(StorageError::Conflict("event hash collided after initial lookup".to_string()));
        }
        store.insert_chunks(&chunks)?;
        Ok(())
    });

    match result {
        Ok(()) => {
            log_audit(store, tenant_id, &actor, "record_event", &event.event_id, AuditOutcome::Success, now_ts);
            Ok(RecordedEvent { event_id: event.event_id, ts: event.ts, chunk_ids })
        }
        Err(err) => {
            warn!(error = %err, "record_event: transaction failed");
            log_audit(store, tenant_id, &actor, "record_event", &event.event_id, AuditOutcome::Failure, now_ts);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{Channel, EventKind, Sensitivity};
    use serde_json::json;

    fn sample_input(text: &str) -> EventInput {
        EventInput {
            session_id: "s1".to_string(),
            channel: Channel::Private,
            actor: ActorRef::human("u1"),
            kind: EventKind::Message,
            sensitivity: Sensitivity::None,
            tags: Vec::new(),
            content: json!({"text": text}),
            refs: Vec::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        }
    }

    #[test]
    fn records_event_and_derives_chunks() {
        let store = Store::open_in_memory().expect("open store");
        let result = record_event(&store, "t1", ActorRef::human("u1"), sample_input("hello world"), 1000)
            .expect("record_event");
        assert!(!result.event_id.is_empty());
        assert_eq!(result.chunk_ids.len(), 1);
        let event = store.get_event("t1", &result.event_id).expect("get_event");
        assert_eq!(event.ts, 1000);
    }

    #[test]
    fn duplicate_submission_is_idempotent() {
        let store = Store::open_in_memory().expect("open store");
        let first = record_event(&store, "t1", ActorRef::human("u1"), sample_input("hello world"), 1000).unwrap();
        let second = record_event(&store, "t1", ActorRef::human("u1"), sample_input("hello world"), 2000).unwrap();
        assert_eq!(first.event_id, second.event_id);
        assert_eq!(first.chunk_ids, second.chunk_ids);
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let mut input = sample_input("hello world");
        input.session_id = "".to_string();
        let err = record_event(&store, "t1", ActorRef::human("u1"), input, 1000).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn unknown_ref_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let mut input = sample_input("hello world");
        input.refs = vec!["evt_does_not_exist".to_string()];
        let err = record_event(&store, "t1", ActorRef::human("u1"), input, 1000).unwrap_err();
        assert_eq!(err.kind(), "integrity_error");
    }

    #[test]
    fn audit_log_records_success_and_failure() {
        let store = Store::open_in_memory().expect("open store");
        record_event(&store, "t1", ActorRef::human("u1"), sample_input("hi"), 1000).unwrap();
        let mut bad_input = sample_input("hi");
        bad_input.session_id = "".to_string();
        let _ = record_event(&store, "t1", ActorRef::human("u1"), bad_input, 1000);
        let recent = store.audit_log_recent("t1", 10).expect("audit_log_recent");
        assert_eq!(recent.len(), 2);
    }
}

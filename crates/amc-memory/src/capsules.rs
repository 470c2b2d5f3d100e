//! Capsule Service business layer (C7): curated, audience-scoped,
//! TTL-bounded transfer bundles validated against tenant-local storage.

use amc_core::{ids, Capsule, CapsuleInput, CapsuleStatus, Config, CoreError};
use amc_storage::{Store, StorageError};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn validate_items(store: &Store, tenant_id: &str, input: &CapsuleInput, config: &Config) -> Result<(), CoreError> {
    if input.audience_agent_ids.is_empty() {
        return Err(CoreError::InvalidArgument("audience must not be empty".to_string()));
    }
    if !(config.capsule_ttl_min_days..=config.capsule_ttl_max_days).contains(&input.ttl_days) {
        return Err(CoreError::InvalidArgument(format!(
            "ttl_days must be in [{},{}]",
            config.capsule_ttl_min_days, config.capsule_ttl_max_days
        )));
    }
    if input.items.is_empty() {
        return Err(CoreError::InvalidArgument("capsule must reference at least one item".to_string()));
    }

    let found_chunks = store.get_chunks_by_ids(tenant_id, &input.items.chunks)?;
    if found_chunks.len() != input.items.chunks.len() {
        return Err(CoreError::IntegrityError("one or more referenced chunks do not exist for this tenant".to_string()));
    }
    for decision_id in &input.items.decisions {
        match store.get_decision(tenant_id, decision_id) {
            Ok(_) => {}
            Err(StorageError::NotFound) => {
                return Err(CoreError::IntegrityError(format!("decision {decision_id} does not exist for this tenant")))
            }
            Err(other) => return Err(other.into()),
        }
    }
    for artifact_id in &input.items.artifacts {
        match store.get_artifact(tenant_id, artifact_id) {
            Ok(_) => {}
            Err(StorageError::NotFound) => {
                return Err(CoreError::IntegrityError(format!("artifact {artifact_id} does not exist for this tenant")))
            }
            Err(other) => return Err(other.into()),
        }
    }
    Ok(())
}

pub fn create(store: &Store, tenant_id: &str, input: CapsuleInput, config: &Config, ts: i64) -> Result<Capsule, CoreError> {
    validate_items(store, tenant_id, &input, config)?;

    let capsule = Capsule {
        capsule_id: ids::new_capsule_id(),
        tenant_id: tenant_id.to_string(),
        ts,
        scope: input.scope,
        subject_type: input.subject_type,
        subject_id: input.subject_id,
        project_id: input.project_id,
        author_agent_id: input.author_agent_id,
        audience_agent_ids: input.audience_agent_ids,
        items: input.items,
        risks: input.risks,
        ttl_days: input.ttl_days,
        status: CapsuleStatus::Active,
        expires_at: ts + i64::from(input.ttl_days) * SECONDS_PER_DAY,
    };
    store.insert_capsule(&capsule)?;
    Ok(capsule)
}

/// Capsules currently visible to `requester_agent_id`, already filtered to
/// `active`, unexpired, audience-matching rows by storage.
pub fn available(
    store: &Store,
    tenant_id: &str,
    requester_agent_id: &str,
    subject: Option<(&str, &str)>,
    now_ts: i64,
) -> Result<Vec<Capsule>, CoreError> {
    Ok(store.capsules_for_requester(tenant_id, requester_agent_id, subject, now_ts)?)
}

/// Fetches one capsule by id, but only if `requester_agent_id` is in its
/// audience. A capsule outside the requester's audience surfaces as
/// `NotFound`, identically to one that never existed — no existence leak.
pub fn get_for_requester(
    store: &Store,
    tenant_id: &str,
    requester_agent_id: &str,
    capsule_id: &str,
    now_ts: i64,
) -> Result<Capsule, CoreError> {
    let capsule = store.get_capsule(tenant_id, capsule_id)?;
    if !capsule.is_visible_to(requester_agent_id, now_ts) {
        return Err(CoreError::NotFound(format!("capsule {capsule_id} not found")));
    }
    Ok(capsule)
}

/// Revokes a capsule. Only the author or a tenant admin may do so; anyone
/// else gets `PermissionDenied` (existence of the capsule is already known
/// to the caller in this path, so there's no leak to guard against).
pub fn revoke(store: &Store, tenant_id: &str, actor_agent_id: &str, actor_is_admin: bool, capsule_id: &str) -> Result<(), CoreError> {
    let capsule = store.get_capsule(tenant_id, capsule_id)?;
    if capsule.author_agent_id != actor_agent_id && !actor_is_admin {
        return Err(CoreError::PermissionDenied(format!("{actor_agent_id} is not the author of capsule {capsule_id}")));
    }
    store.revoke_capsule(tenant_id, capsule_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{ActorRef, CapsuleItems, Channel, Event, EventInput, EventKind, Scope, Sensitivity};

    fn seed_chunk(store: &Store, tenant_id: &str) -> String {
        let input = EventInput {
            session_id: "s1".to_string(),
            channel: Channel::Private,
            actor: ActorRef::human("u1"),
            kind: EventKind::Decision,
            sensitivity: Sensitivity::None,
            tags: Vec::new(),
            content: serde_json::json!({"decision": "seed", "rationale": "seed"}),
            refs: Vec::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        };
        let recorded = amc_ingest::record_event(store, tenant_id, ActorRef::human("u1"), input, 1000).unwrap();
        recorded.chunk_ids[0].clone()
    }

    fn sample_input(chunk_id: String) -> CapsuleInput {
        CapsuleInput {
            scope: Scope::Project,
            subject_type: "project".to_string(),
            subject_id: "proj-1".to_string(),
            project_id: Some("proj-1".to_string()),
            author_agent_id: "agent-a".to_string(),
            audience_agent_ids: vec!["agent-b".to_string()],
            items: CapsuleItems { chunks: vec![chunk_id], decisions: Vec::new(), artifacts: Vec::new() },
            risks: Vec::new(),
            ttl_days: 7,
        }
    }

    #[test]
    fn create_computes_expiry_from_ttl() {
        let store = Store::open_in_memory().expect("open store");
        let chunk_id = seed_chunk(&store, "t1");
        let capsule = create(&store, "t1", sample_input(chunk_id), &Config::default(), 1000).unwrap();
        assert_eq!(capsule.expires_at, 1000 + 7 * SECONDS_PER_DAY);
    }

    #[test]
    fn non_audience_requester_gets_not_found_not_forbidden() {
        let store = Store::open_in_memory().expect("open store");
        let chunk_id = seed_chunk(&store, "t1");
        let capsule = create(&store, "t1", sample_input(chunk_id), &Config::default(), 1000).unwrap();
        let err = get_for_requester(&store, "t1", "agent-outsider", &capsule.capsule_id, 2000).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn audience_member_can_fetch_capsule() {
        let store = Store::open_in_memory().expect("open store");
        let chunk_id = seed_chunk(&store, "t1");
        let capsule = create(&store, "t1", sample_input(chunk_id), &Config::default(), 1000).unwrap();
        let fetched = get_for_requester(&store, "t1", "agent-b", &capsule.capsule_id, 2000).unwrap();
        assert_eq!(fetched.capsule_id, capsule.capsule_id);
    }

    #[test]
    fn revoke_rejects_non_author_non_admin() {
        let store = Store::open_in_memory().expect("open store");
        let chunk_id = seed_chunk(&store, "t1");
        let capsule = create(&store, "t1", sample_input(chunk_id), &Config::default(), 1000).unwrap();
        let err = revoke(&store, "t1", "agent-b", false, &capsule.capsule_id).unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied(_)));
    }

    #[test]
    fn empty_audience_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let chunk_id = seed_chunk(&store, "t1");
        let mut input = sample_input(chunk_id);
        input.audience_agent_ids = Vec::new();
        let err = create(&store, "t1", input, &Config::default(), 1000).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn missing_referenced_chunk_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let mut input = sample_input("chk_does_not_exist".to_string());
        input.items.chunks = vec!["chk_does_not_exist".to_string()];
        let err = create(&store, "t1", input, &Config::default(), 1000).unwrap_err();
        assert!(matches!(err, CoreError::IntegrityError(_)));
    }
}

//! `build_acb`: the read path that assembles decisions, tasks, capsules,
//! chunks, and the last handoff into one token-budgeted bundle.

use std::collections::BTreeMap;

use amc_core::{
    Acb, AcbItem, AcbSection, BuildAcbRequest, Channel, Config, CoreError, EffectiveChunk,
    Mode, Scope, SectionName, Sensitivity, SourceKind,
};
use amc_handoff::handoff_token_estimate;
use amc_memory::retrieval::{RetrievalQuery, ScoringWeights};
use amc_storage::Store;

use crate::mode::{resolve_mode, sub_budgets};
use crate::packing::pack;
use crate::sticky::extract_sticky_invariants;

const TASK_STATES_IN_SCOPE: &[amc_core::TaskStatus] =
    &[amc_core::TaskStatus::Open, amc_core::TaskStatus::Doing, amc_core::TaskStatus::Blocked];

fn validate(request: &BuildAcbRequest) -> Result<(), CoreError> {
    if request.session_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument("session_id must not be empty".to_string()));
    }
    if request.agent_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument("agent_id must not be empty".to_string()));
    }
    if request.intent.trim().is_empty() {
        return Err(CoreError::InvalidArgument("intent must not be empty".to_string()));
    }
    Ok(())
}

/// P5: strips items whose sensitivity is unreadable on this channel.
/// Decisions, tasks, capsules, and handoffs carry no sensitivity field in
/// this data model, so P5 applies only to chunk-derived items.
fn visible_on_channel(channel: Channel, sensitivity: Sensitivity) -> bool {
    match channel {
        Channel::Public => !matches!(sensitivity, Sensitivity::High | Sensitivity::Secret),
        Channel::Team => sensitivity != Sensitivity::Secret,
        Channel::Private | Channel::Agent => true,
    }
}

fn chunk_item(effective: &EffectiveChunk) -> AcbItem {
    let priority = (effective.chunk.importance.clamp(0.0, 1.0) * 500.0) as u32;
    AcbItem {
        text: effective.chunk.text.clone(),
        token_est: effective.chunk.token_est,
        refs: effective.chunk.refs.clone(),
        source_kind: SourceKind::Chunk,
        priority,
    }
}

pub fn build_acb(store: &Store, tenant_id: &str, request: BuildAcbRequest, config: &Config, now_ts: i64) -> Result<Acb, CoreError> {
    validate(&request)?;
    let max_tokens = if request.max_tokens == 0 { config.default_max_tokens } else { request.max_tokens }.clamp(1, 128_000);
    let (mode, fallback_reason) = resolve_mode(&request.intent);
    let subject = match (&request.subject_type, &request.subject_id) {
        (Some(t), Some(i)) => Some((t.as_str(), i.as_str())),
        _ => None,
    };

    let mut edits_applied = 0u32;
    let mut candidates: BTreeMap<SectionName, Vec<AcbItem>> = BTreeMap::new();

    // recent_window + sticky_invariants share one source: the session's
    // effective chunks by ts desc, capped at the candidate pool ceiling.
    let raw_recent = store.recent_chunks(tenant_id, &request.session_id, config.max_candidate_pool as u32)?;
    let mut recent_effective = Vec::new();
    for chunk in &raw_recent {
        if !visible_on_channel(request.channel, chunk.sensitivity) {
            continue;
        }
        let edits = store.approved_edits_for_target(tenant_id, amc_core::TargetType::Chunk, &chunk.chunk_id)?;
        if let Some(effective) = amc_memory::apply_edits_to_chunk(chunk, &edits, request.channel, request.include_quarantined) {
            edits_applied += effective.edits_applied;
            recent_effective.push(effective);
        }
    }
    candidates.insert(SectionName::StickyInvariants, extract_sticky_invariants(&recent_effective));
    candidates.insert(SectionName::RecentWindow, recent_effective.iter().map(chunk_item).collect());

    // relevant_decisions + rules: active decisions for subject/project,
    // rules narrowed to policy scope.
    let active = amc_memory::decisions::get_active(store, tenant_id, subject, request.project_id.as_deref(), request.include_quarantined)?;
    let mut decision_items = Vec::new();
    let mut rule_items = Vec::new();
    for effective in &active {
        let item = AcbItem {
            text: effective.decision.decision.clone(),
            token_est: amc_core::tokens::estimate(&effective.decision.decision),
            refs: effective.decision.refs.clone(),
            source_kind: SourceKind::Decision,
            priority: (effective.decision.scope.precedence() as u32) * 100,
        };
        if effective.decision.scope == Scope::Policy {
            rule_items.push(item.clone());
        }
        decision_items.push(item);
    }
    candidates.insert(SectionName::Rules, rule_items);
    candidates.insert(SectionName::RelevantDecisions, decision_items);

    // task_state: open/doing/blocked tasks, optionally narrowed by project.
    let tasks = match &request.project_id {
        Some(project_id) => store.tasks_for_project(tenant_id, project_id)?,
        None => store.list_tasks(tenant_id, None, None)?,
    };
    let task_items: Vec<AcbItem> = tasks
        .into_iter()
        .filter(|task| TASK_STATES_IN_SCOPE.contains(&task.status))
        .map(|task| AcbItem {
            text: format!("{} ({})", task.title, task.status.as_str()),
            token_est: amc_core::tokens::estimate(&task.title),
            refs: task.refs.clone(),
            source_kind: SourceKind::Task,
            priority: (task.priority.clamp(0, 100) as u32) * 5,
        })
        .collect();
    candidates.insert(SectionName::TaskState, task_items);

    // capsules: curated bundles visible to the requesting agent.
    let capsule_items = if request.include_capsules {
        let capsules = amc_memory::capsules::available(store, tenant_id, &request.agent_id, subject, now_ts)?;
        capsules
            .into_iter()
            .map(|capsule| {
                let text = format!("capsule for {}/{}: {} item(s)", capsule.subject_type, capsule.subject_id, capsule.items.chunks.len() + capsule.items.decisions.len() + capsule.items.artifacts.len());
                AcbItem {
                    token_est: amc_core::tokens::estimate(&text),
                    text,
                    refs: vec![capsule.capsule_id],
                    source_kind: SourceKind::Capsule,
                    priority: 250,
                }
            })
            .collect()
    } else {
        Vec::new()
    };
    candidates.insert(SectionName::Capsules, capsule_items);

    // retrieved_evidence: C5 full-text ranked pool.
    let retrieval_query = RetrievalQuery {
        tenant_id,
        session_id: request.session_id.as_str(),
        channel: request.channel,
        intent_tags: &[],
        query_text: request.query_text.as_deref(),
        scope: None,
        subject,
        project_id: request.project_id.as_deref(),
        include_quarantined: request.include_quarantined,
        max_candidates: config.max_candidate_pool as u32,
    };
    let scored = amc_memory::retrieve(store, &retrieval_query, ScoringWeights::default(), now_ts, config.recency_half_life_seconds)?;
    let retrieved_items: Vec<AcbItem> = scored
        .iter()
        .filter(|candidate| visible_on_channel(request.channel, candidate.effective.chunk.sensitivity))
        .map(|candidate| {
            edits_applied += candidate.effective.edits_applied;
            chunk_item(&candidate.effective)
        })
        .collect();
    candidates.insert(SectionName::RetrievedEvidence, retrieved_items);

    // handoff: last handoff for (tenant, with_whom=agent_id).
    let handoff_items = match store.last_handoff(tenant_id, &request.agent_id)? {
        Some(handoff) => {
            let text = format!("{}\n{}", handoff.story, handoff.remember);
            vec![AcbItem {
                token_est: handoff_token_estimate(&handoff),
                text,
                refs: vec![handoff.handoff_id],
                source_kind: SourceKind::Handoff,
                priority: 250,
            }]
        }
        None => Vec::new(),
    };
    candidates.insert(SectionName::Handoff, handoff_items);

    let budgets = sub_budgets(mode, max_tokens);
    let (packed, budget_exceeded) = pack(mode, max_tokens, candidates, &budgets);

    let sections: Vec<AcbSection> = packed.into_iter().map(|(name, items)| AcbSection { name, items }).collect();
    let token_used_est = sections.iter().map(|s| s.token_total()).sum();

    Ok(Acb {
        sections,
        token_used_est,
        edits_applied,
        mode,
        fallback_reason,
        truncated: false,
        budget_exceeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{ActorRef, Channel as Ch, EventInput, EventKind};
    use amc_ingest::record_event;

    fn seed_event(store: &Store, tenant_id: &str, kind: EventKind, content: serde_json::Value, ts: i64) {
        let input = EventInput {
            session_id: "s1".to_string(),
            channel: Ch::Private,
            actor: ActorRef::human("u1"),
            kind,
            sensitivity: Default::default(),
            tags: Vec::new(),
            content,
            refs: Vec::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        };
        record_event(store, tenant_id, ActorRef::human("u1"), input, ts).expect("record event");
    }

    fn sample_request() -> BuildAcbRequest {
        BuildAcbRequest {
            session_id: "s1".to_string(),
            channel: Ch::Private,
            intent: "repo_onboarding".to_string(),
            query_text: Some("what this project for".to_string()),
            subject_type: None,
            subject_id: None,
            project_id: None,
            agent_id: "agent-a".to_string(),
            max_tokens: 65_000,
            include_capsules: true,
            include_quarantined: false,
        }
    }

    #[test]
    fn builds_acb_within_token_ceiling() {
        let store = Store::open_in_memory().expect("open store");
        seed_event(&store, "t1", EventKind::Message, serde_json::json!({"text": "what this project for?"}), 1000);
        seed_event(&store, "t1", EventKind::Decision, serde_json::json!({"decision": "use sqlite", "rationale": "simplicity"}), 1001);

        let config = Config::default();
        let acb = build_acb(&store, "t1", sample_request(), &config, 2000).expect("build acb");
        assert!(acb.token_used_est <= 65_000);
        assert_eq!(acb.mode, Mode::Exploration);
        assert!(!acb.section(SectionName::RetrievedEvidence).unwrap().items.is_empty());
    }

    #[test]
    fn public_channel_strips_high_sensitivity_chunks() {
        let store = Store::open_in_memory().expect("open store");
        let input = EventInput {
            session_id: "s1".to_string(),
            channel: Ch::Private,
            actor: ActorRef::human("u1"),
            kind: EventKind::Message,
            sensitivity: amc_core::Sensitivity::High,
            tags: Vec::new(),
            content: serde_json::json!({"text": "internal rollout plan details"}),
            refs: Vec::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        };
        record_event(&store, "t1", ActorRef::human("u1"), input, 1000).expect("record");

        let mut request = sample_request();
        request.channel = Ch::Public;
        let config = Config::default();
        let acb = build_acb(&store, "t1", request, &config, 2000).expect("build acb");
        let recent = acb.section(SectionName::RecentWindow).unwrap();
        assert!(recent.items.iter().all(|item| !item.text.contains("rollout plan")));
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        let mut request = sample_request();
        request.session_id = String::new();
        let config = Config::default();
        assert!(matches!(build_acb(&store, "t1", request, &config, 1000), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn floating_summary_never_outranks_grounded_decision() {
        let store = Store::open_in_memory().expect("open store");
        seed_event(&store, "t1", EventKind::Decision, serde_json::json!({"decision": "Token budget is 65K per call", "rationale": "agreed"}), 1000);
        let floating = amc_core::Chunk {
            chunk_id: "floating-1".to_string(),
            tenant_id: "t1".to_string(),
            event_id: "nonexistent".to_string(),
            session_id: "s1".to_string(),
            ts: 999,
            kind: EventKind::Message,
            channel: Ch::Private,
            sensitivity: Default::default(),
            tags: vec!["summary".to_string()],
            text: "Budget is 32K tokens per call".to_string(),
            token_est: 10,
            importance: 0.9,
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
            refs: Vec::new(),
        };
        store.insert_chunks(&[floating]).expect("insert floating chunk");

        let mut request = sample_request();
        request.query_text = Some("what is our budget".to_string());
        let config = Config::default();
        let acb = build_acb(&store, "t1", request, &config, 2000).expect("build acb");
        let evidence = acb.section(SectionName::RetrievedEvidence).unwrap();
        if let Some(first) = evidence.items.first() {
            assert!(first.text.contains("65K"));
        }
    }
}

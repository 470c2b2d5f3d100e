//! Derives searchable `Chunk` rows from a freshly-persisted `Event`.
//!
//! One derivation function per `EventKind`, selected by a small dispatch
//! table; adding a kind means adding a case here plus a storage migration,
//! never touching the caller.

use amc_core::chunk::{MAX_CHUNK_TEXT_BYTES, MESSAGE_CHUNK_SOFT_CAP_TOKENS};
use amc_core::{ids, ActorType, Chunk, Event, EventKind, Sensitivity};

fn sensitivity_penalty(sensitivity: Sensitivity) -> f64 {
    match sensitivity {
        Sensitivity::None => 0.0,
        Sensitivity::Low => 0.05,
        Sensitivity::High => 0.15,
        Sensitivity::Secret => 0.3,
    }
}

fn tag_boost(tags: &[String]) -> f64 {
    let mut boost = 0.0;
    for tag in tags {
        match tag.as_str() {
            "pinned" | "critical" => boost += 0.2,
            "summary" => boost -= 0.1,
            _ => {}
        }
    }
    boost
}

fn seed_importance(event: &Event, base: f64) -> f64 {
    (base + tag_boost(&event.tags) - sensitivity_penalty(event.sensitivity)).clamp(0.0, 1.0)
}

pub fn token_estimate(text: &str) -> u32 {
    amc_core::tokens::estimate(text)
}

fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

fn base_chunk(event: &Event, text: String, importance: f64) -> Chunk {
    let text = truncate_bytes(&text, MAX_CHUNK_TEXT_BYTES);
    let token_est = token_estimate(&text);
    Chunk {
        chunk_id: ids::new_chunk_id(),
        tenant_id: event.tenant_id.clone(),
        event_id: event.event_id.clone(),
        session_id: event.session_id.clone(),
        ts: event.ts,
        kind: event.kind,
        channel: event.channel,
        sensitivity: event.sensitivity,
        tags: event.tags.clone(),
        text,
        token_est,
        importance,
        scope: event.scope,
        subject_type: event.subject_type.clone(),
        subject_id: event.subject_id.clone(),
        project_id: event.project_id.clone(),
        refs: vec![event.event_id.clone()],
    }
}

/// Splits on blank lines, then greedily regroups paragraphs so each chunk
/// stays at or under the soft cap. A single paragraph already over the cap
/// becomes its own oversized chunk rather than being cut mid-sentence.
fn paragraphs_within_cap(text: &str) -> Vec<String> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let mut out = Vec::new();
    let mut current = String::new();
    for paragraph in paragraphs {
        let candidate = if current.is_empty() {
            paragraph.to_string()
        } else {
            format!("{current}\n\n{paragraph}")
        };
        if !current.is_empty() && token_estimate(&candidate) > MESSAGE_CHUNK_SOFT_CAP_TOKENS {
            out.push(current);
            current = paragraph.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn derive_message(event: &Event) -> Vec<Chunk> {
    let Some(text) = event.content.get("text").and_then(|v| v.as_str()) else {
        return Vec::new();
    };
    if text.trim().is_empty() {
        return Vec::new();
    }
    let base = if event.actor.actor_type == ActorType::Human { 0.5 } else { 0.3 };
    paragraphs_within_cap(text)
        .into_iter()
        .map(|paragraph| base_chunk(event, paragraph, seed_importance(event, base)))
        .collect()
}

fn derive_tool_call(event: &Event) -> Vec<Chunk> {
    let tool_name = event.content.get("tool_name").and_then(|v| v.as_str()).unwrap_or("unknown_tool");
    let args = event.content.get("args").map(|v| v.to_string()).unwrap_or_else(|| "{}".to_string());
    let text = format!("called {tool_name} with {args}");
    vec![base_chunk(event, text, seed_importance(event, 0.4))]
}

fn derive_tool_result(event: &Event) -> Vec<Chunk> {
    let text = event
        .content
        .get("excerpt_text")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| event.content.to_string());
    vec![base_chunk(event, text, seed_importance(event, 0.4))]
}

fn derive_decision(event: &Event) -> Vec<Chunk> {
    let decision = event.content.get("decision").and_then(|v| v.as_str()).unwrap_or("");
    let rationale = event.content.get("rationale").and_then(|v| v.as_str()).unwrap_or("");
    let text = if rationale.is_empty() {
        decision.to_string()
    } else {
        format!("{decision}\n\n{rationale}")
    };
    vec![base_chunk(event, text, seed_importance(event, 1.0))]
}

fn derive_task_update(event: &Event) -> Vec<Chunk> {
    let title = event.content.get("title").and_then(|v| v.as_str()).unwrap_or("task update");
    let status = event.content.get("status").and_then(|v| v.as_str()).unwrap_or("");
    let text = if status.is_empty() { title.to_string() } else { format!("{title} ({status})") };
    vec![base_chunk(event, text, seed_importance(event, 0.7))]
}

fn derive_artifact(event: &Event) -> Vec<Chunk> {
    let title = event.content.get("title").and_then(|v| v.as_str()).unwrap_or("artifact");
    let media_type = event.content.get("media_type").and_then(|v| v.as_str()).unwrap_or("unknown");
    let text = format!("{title} ({media_type})");
    vec![base_chunk(event, text, seed_importance(event, 0.4))]
}

/// Dispatch table: one derivation function per kind. Output is inserted
/// into the same transaction as its parent event.
pub fn derive_chunks(event: &Event) -> Vec<Chunk> {
    match event.kind {
        EventKind::Message => derive_message(event),
        EventKind::ToolCall => derive_tool_call(event),
        EventKind::ToolResult => derive_tool_result(event),
        EventKind::Decision => derive_decision(event),
        EventKind::TaskUpdate => derive_task_update(event),
        EventKind::Artifact => derive_artifact(event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::{ActorRef, Channel};
    use serde_json::json;

    fn sample_event(kind: EventKind, content: serde_json::Value) -> Event {
        Event {
            event_id: "evt_1".to_string(),
            tenant_id: "t1".to_string(),
            session_id: "s1".to_string(),
            ts: 1000,
            channel: Channel::Private,
            actor: ActorRef::human("u1"),
            kind,
            sensitivity: Sensitivity::None,
            tags: Vec::new(),
            content,
            refs: Vec::new(),
            scope: None,
            subject_type: None,
            subject_id: None,
            project_id: None,
        }
    }

    #[test]
    fn token_estimate_is_deterministic_and_nonzero() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(token_estimate(text), token_estimate(text));
        assert!(token_estimate(text) > 0);
        assert_eq!(token_estimate(""), 0);
    }

    #[test]
    fn short_message_paragraphs_stay_combined() {
        let event = sample_event(EventKind::Message, json!({"text": "first paragraph\n\nsecond paragraph"}));
        let chunks = derive_chunks(&event);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("first paragraph"));
        assert!(chunks[0].text.contains("second paragraph"));
    }

    #[test]
    fn message_over_cap_splits_into_multiple_chunks() {
        let paragraph = "word ".repeat(1200);
        let text = format!("{paragraph}\n\n{paragraph}");
        let event = sample_event(EventKind::Message, json!({"text": text}));
        let chunks = derive_chunks(&event);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.token_est <= MESSAGE_CHUNK_SOFT_CAP_TOKENS * 2);
        }
    }

    #[test]
    fn decision_importance_is_seeded_at_one() {
        let event = sample_event(EventKind::Decision, json!({"decision": "use sqlite", "rationale": "simplicity"}));
        let chunks = derive_chunks(&event);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].importance, 1.0);
        assert!(chunks[0].text.contains("use sqlite"));
        assert!(chunks[0].text.contains("simplicity"));
    }

    #[test]
    fn tool_result_prefers_excerpt_text_over_raw_payload() {
        let event = sample_event(
            EventKind::ToolResult,
            json!({"excerpt_text": "short summary", "raw": {"huge": "payload"}}),
        );
        let chunks = derive_chunks(&event);
        assert_eq!(chunks[0].text, "short summary");
    }

    #[test]
    fn secret_sensitivity_reduces_importance_below_base() {
        let mut event = sample_event(EventKind::TaskUpdate, json!({"title": "ship it", "status": "done"}));
        event.sensitivity = Sensitivity::Secret;
        let chunks = derive_chunks(&event);
        assert!(chunks[0].importance < 0.7);
    }

    #[test]
    fn pinned_tag_boosts_importance() {
        let mut event = sample_event(EventKind::Artifact, json!({"title": "report.pdf", "media_type": "application/pdf"}));
        event.tags = vec!["pinned".to_string()];
        let chunks = derive_chunks(&event);
        assert!(chunks[0].importance > 0.4);
    }

    #[test]
    fn empty_message_text_yields_no_chunks() {
        let event = sample_event(EventKind::Message, json!({"text": "   "}));
        assert!(derive_chunks(&event).is_empty());
    }

    #[test]
    fn chunk_inherits_scope_and_subject_from_event() {
        let mut event = sample_event(EventKind::Decision, json!({"decision": "x", "rationale": "y"}));
        event.scope = Some(amc_core::Scope::Project);
        event.subject_type = Some("project".to_string());
        event.subject_id = Some("proj-1".to_string());
        let chunks = derive_chunks(&event);
        assert_eq!(chunks[0].scope, Some(amc_core::Scope::Project));
        assert_eq!(chunks[0].subject_id.as_deref(), Some("proj-1"));
    }
}

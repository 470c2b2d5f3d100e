use uuid::Uuid;

/// Generates a namespaced, globally-unique-within-(tenant,kind) identifier.
/// IDs are opaque strings everywhere in the CORE; callers must not parse
/// the prefix for meaning beyond logging/debugging.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

pub fn new_event_id() -> String {
    new_id("evt")
}

pub fn new_chunk_id() -> String {
    new_id("chk")
}

pub fn new_decision_id() -> String {
    new_id("dec")
}

pub fn new_task_id() -> String {
    new_id("task")
}

pub fn new_artifact_id() -> String {
    new_id("art")
}

pub fn new_edit_id() -> String {
    new_id("edit")
}

pub fn new_capsule_id() -> String {
    new_id("cap")
}

pub fn new_handoff_id() -> String {
    new_id("hnd")
}

pub fn new_audit_id() -> String {
    new_id("aud")
}

pub fn new_job_id() -> String {
    new_id("job")
}

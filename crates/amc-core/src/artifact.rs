use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque content-addressed blob, tenant-scoped; referenced by id from
/// events/capsules. The CORE stores and returns it as-is; interpretation
/// of `content` belongs to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub artifact_id: String,
    pub tenant_id: String,
    pub ts: i64,
    pub content_hash: String,
    pub media_type: String,
    pub content: Value,
}

use serde::{Deserialize, Serialize};

use crate::event::{Channel, EventKind, Scope, Sensitivity};

/// Soft cap a single `message` chunk's token estimate is kept under before
/// the Chunker splits the source text into another paragraph chunk.
pub const MESSAGE_CHUNK_SOFT_CAP_TOKENS: u32 = 1000;

/// Upper bound on a chunk's `text` field, enforced by the Chunker.
pub const MAX_CHUNK_TEXT_BYTES: usize = 8 * 1024;

/// A derived, recomputable unit of searchable memory. Created by the
/// Chunker inside the same transaction as its parent `Event`; never edited
/// directly — corrections go through `MemoryEdit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub tenant_id: String,
    pub event_id: String,
    pub session_id: String,
    pub ts: i64,
    pub kind: EventKind,
    pub channel: Channel,
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub text: String,
    pub token_est: u32,
    pub importance: f64,
    pub scope: Option<Scope>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(default)]
    pub refs: Vec<String>,
}

impl Chunk {
    /// `true` when this chunk is a floating, ungrounded summary as defined
    /// by the retrieval suppression rule: no refs, tagged `summary`.
    pub fn is_floating_summary(&self) -> bool {
        self.refs.is_empty() && self.tags.iter().any(|tag| tag == "summary")
    }
}

/// The read-time projection of a base `Chunk` with its latest approved
/// `MemoryEdit`s applied. Never persisted; computed per read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveChunk {
    pub chunk: Chunk,
    pub is_quarantined: bool,
    pub blocked_channels: Vec<Channel>,
    pub edits_applied: u32,
}

impl EffectiveChunk {
    pub fn is_blocked_for(&self, channel: Channel) -> bool {
        self.blocked_channels.contains(&channel)
    }
}

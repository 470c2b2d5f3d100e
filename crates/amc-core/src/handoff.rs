use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    Full,
    Summary,
    QuickRef,
}

impl CompressionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Summary => "summary",
            Self::QuickRef => "quick_ref",
        }
    }
}

impl std::str::FromStr for CompressionLevel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "full" => Ok(Self::Full),
            "summary" => Ok(Self::Summary),
            "quick_ref" => Ok(Self::QuickRef),
            other => Err(format!("unknown compression level: {other}")),
        }
    }
}

/// An immutable structured reflection written at session end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handoff {
    pub handoff_id: String,
    pub tenant_id: String,
    pub with_whom: String,
    pub session_id: String,
    pub ts: i64,
    pub experienced: String,
    pub noticed: String,
    pub learned: String,
    pub story: String,
    pub becoming: String,
    pub remember: String,
    pub significance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub compression_level: CompressionLevel,
    pub influenced_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffInput {
    pub with_whom: String,
    pub session_id: String,
    pub experienced: String,
    pub noticed: String,
    pub learned: String,
    pub story: String,
    pub becoming: String,
    pub remember: String,
    pub significance: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    pub compression_level: CompressionLevel,
    pub influenced_by: Option<String>,
}

/// Aggregated per `(tenant, with_whom)`, maintained by trigger/consolidation
/// refresh — never computed as a correlated subquery on the hot path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffMetadata {
    pub session_count: u32,
    pub first_session: Option<i64>,
    pub last_session: Option<i64>,
    pub significance_avg: f64,
    pub key_people: Vec<String>,
    pub all_tags: Vec<String>,
    pub high_significance_count: u32,
}

/// Cached consolidated insights produced by the consolidation worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reflection {
    pub available: bool,
    pub reason: Option<String>,
    pub insights: Vec<String>,
    pub source_handoff_ids: Vec<String>,
    pub generated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WakeUpLayer {
    Metadata,
    Reflection,
    Recent,
    Progressive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WakeUpRequest {
    pub with_whom: String,
    pub layers: Vec<WakeUpLayer>,
    pub recent_count: Option<u32>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WakeUpResult {
    pub first_session: bool,
    pub metadata: Option<HandoffMetadata>,
    pub reflection: Option<Reflection>,
    pub recent: Vec<Handoff>,
    pub progressive: Vec<Handoff>,
    pub estimated_tokens: u32,
    pub compression_ratio: f64,
}

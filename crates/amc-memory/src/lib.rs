//! Business logic over durable storage: the Effective View merge, the
//! retrieval scorer, the Decision Ledger, and the Capsule Service. Every
//! public operation here returns `amc_core::CoreError`, the caller-facing
//! taxonomy — storage errors are translated at this layer's boundary.

pub mod capsules;
pub mod decisions;
pub mod effective_view;
pub mod project;
pub mod retrieval;
pub mod timeline;

pub use effective_view::{apply_edits_to_chunk, apply_edits_to_decision};
pub use project::{get_project_summary, ProjectSummary};
pub use retrieval::{recency_decay, retrieve, RetrievalQuery, ScoredChunk, ScoringWeights};
pub use timeline::{get_timeline, TimelineNeighbor};

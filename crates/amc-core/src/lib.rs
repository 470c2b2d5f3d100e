//! Shared data model, error taxonomy, and cross-cutting helpers used by
//! every other `amc-*` crate. No I/O lives here.

pub mod acb;
pub mod artifact;
pub mod audit;
pub mod capsule;
pub mod chunk;
pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod handoff;
pub mod hashing;
pub mod ids;
pub mod memory_edit;
pub mod task;
pub mod tenant;
pub mod tokens;

pub use acb::{Acb, AcbItem, AcbSection, BuildAcbRequest, Mode, SectionName, SourceKind};
pub use artifact::Artifact;
pub use audit::{AuditLogEntry, AuditOutcome};
pub use capsule::{Capsule, CapsuleInput, CapsuleItems, CapsuleStatus};
pub use chunk::{Chunk, EffectiveChunk};
pub use config::Config;
pub use decision::{Decision, DecisionInput, DecisionStatus, EffectiveDecision};
pub use error::CoreError;
pub use event::{Channel, Event, EventInput, EventKind, Scope, Sensitivity, Subject};
pub use handoff::{
    CompressionLevel, Handoff, HandoffInput, HandoffMetadata, Reflection, WakeUpLayer,
    WakeUpRequest, WakeUpResult,
};
pub use memory_edit::{EditOp, EditPatch, EditStatus, MemoryEdit, MemoryEditInput, TargetType};
pub use task::{ProjectSummary, Task, TaskInput, TaskStatus, TaskUpdateInput};
pub use tenant::{ActorRef, ActorType, TenantContext};

/// Result alias used throughout the workspace's core operations.
pub type CoreResult<T> = Result<T, CoreError>;

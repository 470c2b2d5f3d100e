//! Stratified session handoffs: immutable cross-session notes between an
//! agent and a person (or another agent), plus the layered wake-up read
//! that lets a reconnecting session pull only as much history as it needs.

pub mod create;
pub mod reflect;
pub mod wake_up;

pub use create::{create_handoff, refresh_metadata};
pub use reflect::{generate_reflection, REFLECTION_THRESHOLD};
pub use wake_up::{handoff_token_estimate, wake_up_stratified};

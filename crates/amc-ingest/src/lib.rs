//! Event ingestion: validates and persists events, derives chunks, and
//! writes the audit trail. The only door new memory enters through.

pub mod chunker;
pub mod recorder;

pub use chunker::{derive_chunks, token_estimate};
pub use recorder::{record_event, RecordedEvent};

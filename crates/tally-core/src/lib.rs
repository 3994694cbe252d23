//! Tally Core — event-sourcing abstractions and the replay engine.
//!
//! Aggregates persist as an append-only log of event records, optionally
//! accelerated by snapshots. This crate defines the traits an aggregate and a
//! store implement, the concurrency guard that appends events, and the
//! single and batched replay algorithms. It contains no infrastructure code.

pub mod aggregate;
pub mod batch;
pub mod clock;
pub mod error;
pub mod event;
pub mod guard;
pub mod record;
pub mod registry;
pub mod replay;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

pub use aggregate::Aggregate;
pub use batch::restore_many;
pub use error::DomainError;
pub use event::DomainEvent;
pub use guard::{trigger_event, trigger_event_with_policy};
pub use replay::{RestorePoint, load_history, restore, restore_at, restore_latest};
pub use snapshot::{SnapshotPolicy, snapshot};

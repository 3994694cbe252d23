//! Domain error types.

use thiserror::Error;

use crate::record::RecordKind;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A mutating operation ran outside an active unit of work.
    #[error("operation requires an active transaction")]
    TransactionRequired,

    /// Optimistic concurrency conflict between the event and the aggregate.
    #[error("version conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// The aggregate that had the conflict.
        aggregate_id: u64,
        /// The version the event was issued against.
        expected: u64,
        /// The version the aggregate is actually at.
        actual: u64,
    },

    /// A restore call named both or neither of version and timestamp.
    #[error("exactly one of version or timestamp must be given to restore")]
    AmbiguousRestorePoint,

    /// A stored topic does not resolve to a registered event type.
    #[error("unknown event topic: {0}")]
    UnknownEventTopic(String),

    /// The store rejected a row because its `(originator_id, originator_version)`
    /// slot is already taken.
    #[error("duplicate {kind} record for originator {originator_id} at version {originator_version}")]
    DuplicateRecord {
        /// Whether the clash was in the event log or the snapshot log.
        kind: RecordKind,
        /// The aggregate the row belongs to.
        originator_id: u64,
        /// The contested version.
        originator_version: u64,
    },

    /// The aggregate has no recorded history.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(u64),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// Event or aggregate state could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl DomainError {
    /// Returns `true` when the caller should re-fetch the aggregate and retry
    /// the whole append in a fresh unit of work.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::DuplicateRecord { .. }
        )
    }
}

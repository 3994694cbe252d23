//! Snapshot capture.

use std::num::NonZeroU64;

use tracing::{info, instrument};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::record::{EventRecord, NewRecord, RecordKind};
use crate::store::UnitOfWork;

/// When [`trigger_event_with_policy`](crate::guard::trigger_event_with_policy)
/// captures a snapshot after an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotPolicy {
    /// Only explicit [`snapshot`] calls write snapshots.
    #[default]
    Never,
    /// Snapshot whenever the new version is a multiple of `n`.
    EveryNEvents(NonZeroU64),
}

impl SnapshotPolicy {
    /// Whether an aggregate that just reached `version` should be captured.
    #[must_use]
    pub fn should_snapshot(self, version: u64) -> bool {
        match self {
            Self::Never => false,
            Self::EveryNEvents(n) => version > 0 && version % n.get() == 0,
        }
    }
}

/// Writes one snapshot row capturing the aggregate's full current state at
/// its current version. The event log is left untouched.
///
/// # Errors
///
/// Returns `DomainError::TransactionRequired` if the unit of work is no
/// longer active, `DomainError::DuplicateRecord` if a snapshot already exists
/// at this version, and any serialization or store error.
#[instrument(
    skip(unit_of_work, aggregate),
    fields(
        aggregate_type = A::AGGREGATE_TYPE,
        originator_id = aggregate.aggregate_id(),
        version = aggregate.version()
    )
)]
pub async fn snapshot<A: Aggregate>(
    unit_of_work: &mut dyn UnitOfWork,
    aggregate: &A,
) -> Result<EventRecord, DomainError> {
    if !unit_of_work.is_active() {
        return Err(DomainError::TransactionRequired);
    }

    let record = unit_of_work
        .append(NewRecord {
            kind: RecordKind::Snapshot,
            topic: A::AGGREGATE_TYPE.to_owned(),
            originator_id: aggregate.aggregate_id(),
            originator_version: aggregate.version(),
            state: serde_json::to_value(aggregate)?,
        })
        .await?;

    info!("snapshot written");
    Ok(record)
}

//! Concurrency guard: the only path by which events enter the log.

use tracing::{info, instrument, warn};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::record::{EventRecord, NewRecord, RecordKind};
use crate::snapshot::{SnapshotPolicy, snapshot};
use crate::store::UnitOfWork;

/// Rows written by [`trigger_event_with_policy`].
#[derive(Debug, Clone)]
pub struct Triggered {
    /// The appended event row.
    pub event: EventRecord,
    /// The snapshot row, when the policy asked for one.
    pub snapshot: Option<EventRecord>,
}

/// Appends `event` to the log and applies it to `aggregate`.
///
/// The row is recorded at the aggregate's version before the event; after
/// the call the aggregate's version is one higher. Nothing is retried; on
/// conflict the caller must re-fetch the aggregate and reissue the event in
/// a fresh unit of work.
///
/// # Errors
///
/// Returns `DomainError::TransactionRequired` if the unit of work is no
/// longer active, `DomainError::VersionConflict` if the event was issued
/// against a different version than the aggregate is at,
/// `DomainError::UnknownEventTopic` if the aggregate's registry could not
/// replay the event, and any store error (`DomainError::DuplicateRecord`
/// when another writer already took the version).
#[instrument(
    skip(unit_of_work, aggregate, event),
    fields(
        aggregate_type = A::AGGREGATE_TYPE,
        originator_id = aggregate.aggregate_id(),
        event_type = event.event_type()
    )
)]
pub async fn trigger_event<A: Aggregate>(
    unit_of_work: &mut dyn UnitOfWork,
    aggregate: &mut A,
    event: A::Event,
) -> Result<EventRecord, DomainError> {
    if !unit_of_work.is_active() {
        return Err(DomainError::TransactionRequired);
    }

    if aggregate.version() != event.version() {
        warn!(
            expected = event.version(),
            actual = aggregate.version(),
            "rejecting event issued against a stale version"
        );
        return Err(DomainError::VersionConflict {
            aggregate_id: aggregate.aggregate_id(),
            expected: event.version(),
            actual: aggregate.version(),
        });
    }

    let topic = A::event_topic(&event);
    if !A::event_registry().contains(event.event_type()) {
        return Err(DomainError::UnknownEventTopic(topic));
    }

    let record = unit_of_work
        .append(NewRecord {
            kind: RecordKind::Event,
            topic,
            originator_id: aggregate.aggregate_id(),
            originator_version: aggregate.version(),
            state: event.to_payload()?,
        })
        .await?;

    aggregate.apply(&event);
    info!(version = aggregate.version(), "event appended");
    Ok(record)
}

/// [`trigger_event`], followed by a snapshot when `policy` asks for one at
/// the aggregate's new version. Both rows go through the same unit of work.
///
/// # Errors
///
/// See [`trigger_event`] and [`snapshot`].
pub async fn trigger_event_with_policy<A: Aggregate>(
    unit_of_work: &mut dyn UnitOfWork,
    aggregate: &mut A,
    event: A::Event,
    policy: SnapshotPolicy,
) -> Result<Triggered, DomainError> {
    let event = trigger_event(unit_of_work, aggregate, event).await?;
    let captured = if policy.should_snapshot(aggregate.version()) {
        Some(snapshot(unit_of_work, aggregate).await?)
    } else {
        None
    };
    Ok(Triggered {
        event,
        snapshot: captured,
    })
}

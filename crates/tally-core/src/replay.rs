//! Aggregate replay engine.
//!
//! Reconstructs one aggregate at a version or point in time: start from the
//! newest usable snapshot (or a bare aggregate), then fold the trailing
//! events in version order.
//!
//! Event rows are recorded at the version the aggregate was at *before* the
//! event, so a snapshot at version `v` already contains every event below
//! `v` and the trailing events are exactly those at `v` and above.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::record::{EventRecord, OriginatorFilter, RecordQuery};
use crate::store::RecordStore;

/// Where a restore stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePoint {
    /// The aggregate as it was at this version (this many events applied).
    Version(u64),
    /// The aggregate as it was at this instant, inclusive.
    Timestamp(DateTime<Utc>),
}

impl RestorePoint {
    /// Builds a restore point from two optional bounds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AmbiguousRestorePoint` unless exactly one bound
    /// is given.
    pub fn from_bounds(
        version: Option<u64>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        match (version, timestamp) {
            (Some(version), None) => Ok(Self::Version(version)),
            (None, Some(timestamp)) => Ok(Self::Timestamp(timestamp)),
            _ => Err(DomainError::AmbiguousRestorePoint),
        }
    }
}

/// Restores aggregate `id` at exactly one of `version` or `timestamp`.
///
/// An id with no rows restores to a bare aggregate.
///
/// # Errors
///
/// Returns `DomainError::AmbiguousRestorePoint` unless exactly one bound is
/// given, `DomainError::UnknownEventTopic` for rows no registered event
/// matches, and any store error.
pub async fn restore<A: Aggregate>(
    store: &dyn RecordStore,
    id: u64,
    version: Option<u64>,
    timestamp: Option<DateTime<Utc>>,
) -> Result<A, DomainError> {
    let point = RestorePoint::from_bounds(version, timestamp)?;
    restore_at(store, id, point).await
}

/// Restores aggregate `id` at `point`.
///
/// # Errors
///
/// See [`restore`].
#[instrument(skip(store), fields(aggregate_type = A::AGGREGATE_TYPE))]
pub async fn restore_at<A: Aggregate>(
    store: &dyn RecordStore,
    id: u64,
    point: RestorePoint,
) -> Result<A, DomainError> {
    let snapshot_query = RecordQuery::snapshots(A::AGGREGATE_TYPE, OriginatorFilter::One(id))
        .newest_first()
        .limit(1);
    let mut event_query = RecordQuery::events(A::event_topic_prefix(), OriginatorFilter::One(id));
    let snapshot_query = match point {
        RestorePoint::Version(version) => {
            event_query = event_query.version_below(version);
            snapshot_query.version_at_most(version)
        }
        RestorePoint::Timestamp(at) => {
            event_query = event_query.recorded_until(at);
            snapshot_query.recorded_until(at)
        }
    };

    let snapshot = store.query(&snapshot_query).await?.into_iter().next();
    let (accumulator, event_query) = start_from::<A>(id, snapshot.as_ref(), event_query)?;
    let events = store.query(&event_query).await?;
    fold(accumulator, &events)
}

/// Restores the current state of aggregate `id`: the newest snapshot plus
/// every event after it.
///
/// # Errors
///
/// Returns `DomainError::UnknownEventTopic` for rows no registered event
/// matches, and any store error.
#[instrument(skip(store), fields(aggregate_type = A::AGGREGATE_TYPE))]
pub async fn restore_latest<A: Aggregate>(
    store: &dyn RecordStore,
    id: u64,
) -> Result<A, DomainError> {
    let snapshot_query = RecordQuery::snapshots(A::AGGREGATE_TYPE, OriginatorFilter::One(id))
        .newest_first()
        .limit(1);
    let event_query = RecordQuery::events(A::event_topic_prefix(), OriginatorFilter::One(id));

    let snapshot = store.query(&snapshot_query).await?.into_iter().next();
    let (accumulator, event_query) = start_from::<A>(id, snapshot.as_ref(), event_query)?;
    let events = store.query(&event_query).await?;
    fold(accumulator, &events)
}

/// Loads and decodes the full event history of aggregate `id`, oldest first.
///
/// # Errors
///
/// Returns `DomainError::UnknownEventTopic` for rows no registered event
/// matches, and any store error.
#[instrument(skip(store), fields(aggregate_type = A::AGGREGATE_TYPE))]
pub async fn load_history<A: Aggregate>(
    store: &dyn RecordStore,
    id: u64,
) -> Result<Vec<A::Event>, DomainError> {
    let query = RecordQuery::events(A::event_topic_prefix(), OriginatorFilter::One(id));
    let registry = A::event_registry();
    store
        .query(&query)
        .await?
        .iter()
        .map(|record| registry.decode(record))
        .collect()
}

fn start_from<A: Aggregate>(
    id: u64,
    snapshot: Option<&EventRecord>,
    event_query: RecordQuery,
) -> Result<(A, RecordQuery), DomainError> {
    match snapshot {
        Some(record) => {
            debug!(
                originator_id = id,
                snapshot_version = record.originator_version,
                "starting replay from snapshot"
            );
            let aggregate = load_snapshot::<A>(record)?;
            Ok((aggregate, event_query.version_from(record.originator_version)))
        }
        None => Ok((A::new(id), event_query)),
    }
}

/// Deserializes a snapshot row into a live aggregate.
pub(crate) fn load_snapshot<A: Aggregate>(record: &EventRecord) -> Result<A, DomainError> {
    let aggregate: A = serde_json::from_value(record.state.clone()).map_err(|e| {
        DomainError::Serialization(format!(
            "failed to decode {} snapshot of {} at version {}: {e}",
            record.topic, record.originator_id, record.originator_version
        ))
    })?;
    if aggregate.version() != record.originator_version
        || aggregate.aggregate_id() != record.originator_id
    {
        return Err(DomainError::Serialization(format!(
            "snapshot state of {} at version {} does not match its record",
            record.originator_id, record.originator_version
        )));
    }
    Ok(aggregate)
}

/// Folds event rows, already in ascending version order, onto `aggregate`.
pub(crate) fn fold<A: Aggregate>(
    mut aggregate: A,
    events: &[EventRecord],
) -> Result<A, DomainError> {
    let registry = A::event_registry();
    for record in events {
        if record.originator_version != aggregate.version() {
            warn!(
                originator_id = record.originator_id,
                record_version = record.originator_version,
                aggregate_version = aggregate.version(),
                "event version does not follow aggregate version"
            );
        }
        let event = registry.decode(record)?;
        aggregate.apply(&event);
    }
    debug!(
        originator_id = aggregate.aggregate_id(),
        applied = events.len(),
        version = aggregate.version(),
        "replayed events"
    );
    Ok(aggregate)
}

//! Batch replay engine.
//!
//! Restores many aggregates of one type as of a shared instant with one
//! snapshot query and one event query, regardless of how many ids are asked
//! for.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::record::{EventRecord, OriginatorFilter, RecordQuery, TrailingBound};
use crate::replay::{fold, load_snapshot};
use crate::store::RecordStore;

/// Restores every aggregate in `ids` as of `timestamp`, inclusive.
///
/// The result has exactly one entry per distinct id; ids without any rows map
/// to a bare aggregate. An empty id set returns an empty map without touching
/// the store.
///
/// # Errors
///
/// Returns `DomainError::UnknownEventTopic` for rows no registered event
/// matches, and any store error.
#[instrument(skip(store, ids), fields(aggregate_type = A::AGGREGATE_TYPE, requested = ids.len()))]
pub async fn restore_many<A: Aggregate>(
    store: &dyn RecordStore,
    ids: &BTreeSet<u64>,
    timestamp: DateTime<Utc>,
) -> Result<BTreeMap<u64, A>, DomainError> {
    if ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let snapshot_query =
        RecordQuery::snapshots(A::AGGREGATE_TYPE, OriginatorFilter::Any(ids.clone()))
            .recorded_until(timestamp);
    let snapshots = newest_per_originator(store.query(&snapshot_query).await?);
    debug!(snapshots = snapshots.len(), "selected batch snapshots");

    let bounds = ids
        .iter()
        .map(|&originator_id| TrailingBound {
            originator_id,
            from_version: snapshots
                .get(&originator_id)
                .map(|record| record.originator_version),
        })
        .collect();
    let event_query = RecordQuery::events(A::event_topic_prefix(), OriginatorFilter::Trailing(bounds))
        .recorded_until(timestamp);
    let events = store.query(&event_query).await?;
    debug!(events = events.len(), "loaded batch events");

    let mut restored = BTreeMap::new();
    for (originator_id, snapshot) in &snapshots {
        restored.insert(*originator_id, load_snapshot::<A>(snapshot)?);
    }

    for group in events.chunk_by(|a, b| a.originator_id == b.originator_id) {
        let originator_id = group[0].originator_id;
        let accumulator = match restored.remove(&originator_id) {
            Some(aggregate) => aggregate,
            None => A::new(originator_id),
        };
        restored.insert(originator_id, fold(accumulator, group)?);
    }

    for &id in ids {
        restored.entry(id).or_insert_with(|| A::new(id));
    }

    Ok(restored)
}

/// Keeps the highest-versioned snapshot per originator. Recording order plays
/// no part: a snapshot of an earlier version taken later never displaces a
/// newer state.
fn newest_per_originator(snapshots: Vec<EventRecord>) -> BTreeMap<u64, EventRecord> {
    let mut newest: BTreeMap<u64, EventRecord> = BTreeMap::new();
    for record in snapshots {
        let replace = newest
            .get(&record.originator_id)
            .is_none_or(|current| record.originator_version > current.originator_version);
        if replace {
            newest.insert(record.originator_id, record);
        }
    }
    newest
}

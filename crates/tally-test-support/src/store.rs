//! Test stores — `RecordStore` implementations for tests.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tally_core::clock::{Clock, SystemClock};
use tally_core::error::DomainError;
use tally_core::record::{EventRecord, NewRecord, RecordKind, RecordQuery};
use tally_core::store::{RecordStore, UnitOfWork};
use uuid::Uuid;

/// An in-memory record store with the same observable semantics as the
/// PostgreSQL store: rows appended in a unit of work stay private until
/// commit, `(originator_id, originator_version)` is unique per kind, and every
/// row is stamped by the store's clock at append time. Stamps strictly
/// increase: a clock that has not moved since the previous append yields the
/// previous stamp plus one microsecond.
///
/// Every query is recorded so tests can assert how many round trips an
/// operation made.
pub struct InMemoryRecordStore {
    clock: Arc<dyn Clock>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    committed: Mutex<Vec<EventRecord>>,
    queries: Mutex<Vec<RecordQuery>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store stamped by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store stamped by `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_stamp: Mutex::new(None),
            committed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns every committed row in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<EventRecord> {
        self.committed.lock().unwrap().clone()
    }

    /// Returns every query run so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn queries(&self) -> Vec<RecordQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn stamp(&self) -> Result<DateTime<Utc>, DomainError> {
        let mut last = self.last_stamp.lock().map_err(poisoned)?;
        let now = self.clock.now();
        let stamp = match *last {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        Ok(stamp)
    }

    /// Deletes every committed snapshot row. Normal operation never does
    /// this; tests use it to compare replays with and without snapshots.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn remove_snapshots(&self) {
        self.committed
            .lock()
            .unwrap()
            .retain(|record| record.kind != RecordKind::Snapshot);
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("records", &self.committed.lock().ok().map(|rows| rows.len()))
            .finish_non_exhaustive()
    }
}

fn occupies_same_slot(existing: &EventRecord, record: &NewRecord) -> bool {
    existing.kind == record.kind
        && existing.originator_id == record.originator_id
        && existing.originator_version == record.originator_version
}

fn same_slot(a: &EventRecord, b: &EventRecord) -> bool {
    a.kind == b.kind
        && a.originator_id == b.originator_id
        && a.originator_version == b.originator_version
}

fn poisoned<T>(_: T) -> DomainError {
    DomainError::Infrastructure("in-memory store lock poisoned".into())
}

fn duplicate(record: &EventRecord) -> DomainError {
    DomainError::DuplicateRecord {
        kind: record.kind,
        originator_id: record.originator_id,
        originator_version: record.originator_version,
    }
}

/// A unit of work over an [`InMemoryRecordStore`].
struct InMemoryUnitOfWork<'a> {
    store: &'a InMemoryRecordStore,
    pending: Vec<EventRecord>,
    active: bool,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork<'_> {
    fn is_active(&self) -> bool {
        self.active
    }

    async fn append(&mut self, record: NewRecord) -> Result<EventRecord, DomainError> {
        if !self.active {
            return Err(DomainError::TransactionRequired);
        }
        record.validate()?;

        let clashes = {
            let committed = self.store.committed.lock().map_err(poisoned)?;
            committed
                .iter()
                .chain(self.pending.iter())
                .any(|existing| occupies_same_slot(existing, &record))
        };
        if clashes {
            return Err(DomainError::DuplicateRecord {
                kind: record.kind,
                originator_id: record.originator_id,
                originator_version: record.originator_version,
            });
        }

        let stored = EventRecord {
            record_id: Uuid::now_v7(),
            kind: record.kind,
            topic: record.topic,
            originator_id: record.originator_id,
            originator_version: record.originator_version,
            state: record.state,
            timestamp: self.store.stamp()?,
        };
        self.pending.push(stored.clone());
        Ok(stored)
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        if !self.active {
            return Err(DomainError::TransactionRequired);
        }
        self.active = false;

        let mut committed = self.store.committed.lock().map_err(poisoned)?;
        let clash = self
            .pending
            .iter()
            .find(|record| committed.iter().any(|existing| same_slot(existing, record)))
            .map(duplicate);
        if let Some(err) = clash {
            self.pending.clear();
            return Err(err);
        }
        committed.append(&mut self.pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.active = false;
        self.pending.clear();
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, DomainError> {
        Ok(Box::new(InMemoryUnitOfWork {
            store: self,
            pending: Vec::new(),
            active: true,
        }))
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<EventRecord>, DomainError> {
        self.queries.lock().map_err(poisoned)?.push(query.clone());
        let committed = self.committed.lock().map_err(poisoned)?;
        Ok(query.select(committed.iter()))
    }
}

/// A record store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn query(&self, _query: &RecordQuery) -> Result<Vec<EventRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

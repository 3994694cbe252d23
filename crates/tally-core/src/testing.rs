//! Fixtures for this crate's unit tests: a counter aggregate and a store that
//! keeps rows in a vector with no transaction isolation.

use std::sync::{LazyLock, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::event::{DomainEvent, payload_with_version};
use crate::record::{EventRecord, NewRecord, RecordKind, RecordQuery};
use crate::registry::EventRegistry;
use crate::store::{RecordStore, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Counter {
    pub id: u64,
    pub version: u64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Added {
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct CounterEvent {
    pub version: u64,
    pub added: Added,
}

impl CounterEvent {
    pub(crate) fn added(version: u64, amount: i64) -> Self {
        Self {
            version,
            added: Added { amount },
        }
    }
}

impl DomainEvent for CounterEvent {
    type Aggregate = Counter;

    fn event_type(&self) -> &'static str {
        "Added"
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        payload_with_version(&self.added, self.version)
    }

    fn apply(&self, aggregate: &mut Counter) {
        aggregate.count += self.added.amount;
    }
}

static REGISTRY: LazyLock<EventRegistry<CounterEvent>> = LazyLock::new(|| {
    EventRegistry::new("Counter").register("Added", |version, added: Added| CounterEvent {
        version,
        added,
    })
});

impl Aggregate for Counter {
    const AGGREGATE_TYPE: &'static str = "Counter";
    type Event = CounterEvent;

    fn new(id: u64) -> Self {
        Self {
            id,
            version: 0,
            count: 0,
        }
    }

    fn aggregate_id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn event_registry() -> &'static EventRegistry<CounterEvent> {
        &REGISTRY
    }
}

/// Hour `h` of a fixed test day.
pub(crate) fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, hour, 0, 0).unwrap()
}

/// Rows live in one vector; appends are visible immediately. Every append is
/// stamped with the store's current time, which tests move explicitly, and
/// then advances it by the tick (one microsecond unless set).
#[derive(Debug)]
pub(crate) struct VecStore {
    rows: Mutex<Vec<EventRecord>>,
    now: Mutex<DateTime<Utc>>,
    tick: Mutex<Duration>,
    queries: Mutex<usize>,
}

impl VecStore {
    pub(crate) fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            now: Mutex::new(at_hour(10)),
            tick: Mutex::new(Duration::microseconds(1)),
            queries: Mutex::new(0),
        }
    }

    pub(crate) fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub(crate) fn set_tick(&self, tick: Duration) {
        *self.tick.lock().unwrap() = tick;
    }

    pub(crate) fn rows(&self) -> Vec<EventRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub(crate) fn remove_snapshots(&self) {
        self.rows
            .lock()
            .unwrap()
            .retain(|record| record.kind != RecordKind::Snapshot);
    }

    pub(crate) fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    fn insert(&self, record: NewRecord) -> Result<EventRecord, DomainError> {
        record.validate()?;
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|existing| {
            existing.kind == record.kind
                && existing.originator_id == record.originator_id
                && existing.originator_version == record.originator_version
        }) {
            return Err(DomainError::DuplicateRecord {
                kind: record.kind,
                originator_id: record.originator_id,
                originator_version: record.originator_version,
            });
        }
        let mut now = self.now.lock().unwrap();
        let stored = EventRecord {
            record_id: Uuid::new_v4(),
            kind: record.kind,
            topic: record.topic,
            originator_id: record.originator_id,
            originator_version: record.originator_version,
            state: record.state,
            timestamp: *now,
        };
        *now += *self.tick.lock().unwrap();
        rows.push(stored.clone());
        Ok(stored)
    }
}

pub(crate) struct VecUnitOfWork<'a> {
    store: &'a VecStore,
    active: bool,
}

#[async_trait]
impl UnitOfWork for VecUnitOfWork<'_> {
    fn is_active(&self) -> bool {
        self.active
    }

    async fn append(&mut self, record: NewRecord) -> Result<EventRecord, DomainError> {
        if !self.active {
            return Err(DomainError::TransactionRequired);
        }
        self.store.insert(record)
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        self.active = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        self.active = false;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for VecStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, DomainError> {
        Ok(Box::new(VecUnitOfWork {
            store: self,
            active: true,
        }))
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<EventRecord>, DomainError> {
        *self.queries.lock().unwrap() += 1;
        Ok(query.select(self.rows.lock().unwrap().iter()))
    }
}

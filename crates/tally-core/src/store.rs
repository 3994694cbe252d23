//! Record store abstraction.
//!
//! The engine never talks to a database directly. It reads through
//! [`RecordStore::query`] and writes through a [`UnitOfWork`] obtained from
//! [`RecordStore::begin`].

use async_trait::async_trait;

use crate::error::DomainError;
use crate::record::{EventRecord, NewRecord, RecordQuery};

/// An atomic unit of work against the record log.
///
/// Appends are only visible to other readers after [`commit`](Self::commit).
/// Once committed or rolled back the unit is no longer active and every
/// further append fails with `DomainError::TransactionRequired`.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Whether this unit can still accept appends.
    fn is_active(&self) -> bool;

    /// Appends one row. The store assigns `record_id` and `timestamp` and
    /// enforces `(originator_id, originator_version)` uniqueness per kind.
    async fn append(&mut self, record: NewRecord) -> Result<EventRecord, DomainError>;

    /// Makes all appends durable and visible.
    async fn commit(&mut self) -> Result<(), DomainError>;

    /// Discards all appends.
    async fn rollback(&mut self) -> Result<(), DomainError>;
}

/// Transactional storage for event and snapshot rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>, DomainError>;

    /// Returns the committed rows matching `query`, in the requested order.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<EventRecord>, DomainError>;
}

//! Tally Event Store — PostgreSQL implementation of the record store.
//!
//! Events and snapshots live in one `event_records` table. The table is
//! created by the migrations under `migrations/`, which [`config::migrate`]
//! applies.

pub mod config;
pub mod pg_record_store;

pub use config::{ConfigError, EventStoreConfig, migrate};
pub use pg_record_store::{PgRecordStore, PgUnitOfWork};

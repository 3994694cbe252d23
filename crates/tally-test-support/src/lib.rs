//! Shared test stores, clocks and utilities for Tally.

mod clock;
mod store;
mod telemetry;

pub use clock::{FixedClock, ManualClock};
pub use store::{FailingRecordStore, InMemoryRecordStore};
pub use telemetry::init_tracing;

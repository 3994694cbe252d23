//! Command handlers for the Orders context.
//!
//! Each handler loads the current order, builds the event, and records it
//! through the concurrency guard inside one unit of work. Nothing is retried:
//! a conflict is returned to the caller, who must reload and reissue.

use tally_core::aggregate::Aggregate;
use tally_core::error::DomainError;
use tally_core::guard::{trigger_event, trigger_event_with_policy};
use tally_core::record::EventRecord;
use tally_core::replay::restore_latest;
use tally_core::snapshot::{SnapshotPolicy, snapshot};
use tally_core::store::{RecordStore, UnitOfWork};
use tracing::{info, instrument, warn};

use crate::domain::aggregates::Order;
use crate::domain::commands::{CreateOrder, ProcessPayment, SnapshotOrder};

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct OrderCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: u64,
    /// The order's version once the command has been applied.
    pub version: u64,
    /// The rows written, in append order.
    pub records: Vec<EventRecord>,
}

/// Rolls back `unit_of_work` and hands `err` back to the caller. A rollback
/// failure is logged; the original error wins.
async fn abort(unit_of_work: &mut dyn UnitOfWork, err: DomainError) -> DomainError {
    if let Err(rollback_err) = unit_of_work.rollback().await {
        warn!(error = %rollback_err, "rollback failed");
    }
    err
}

/// Loads the current state of an order that must already exist.
async fn load_existing(store: &dyn RecordStore, order_id: u64) -> Result<Order, DomainError> {
    let order: Order = restore_latest(store, order_id).await?;
    if order.version() == 0 {
        return Err(DomainError::AggregateNotFound(order_id));
    }
    Ok(order)
}

/// Handles the `CreateOrder` command: records `OrderCreated` at version 0.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a negative total,
/// `DomainError::DuplicateRecord` if the id is already taken, and any store
/// error.
#[instrument(skip(store), fields(order_id = command.order_id))]
pub async fn handle_create_order(
    command: &CreateOrder,
    store: &dyn RecordStore,
) -> Result<OrderCommandResult, DomainError> {
    let mut order = Order::new(command.order_id);
    let event = order.create(command.total)?;

    let mut unit_of_work = store.begin().await?;
    let record = match trigger_event(unit_of_work.as_mut(), &mut order, event).await {
        Ok(record) => record,
        Err(err) => return Err(abort(unit_of_work.as_mut(), err).await),
    };
    unit_of_work.commit().await?;

    info!(total = order.total, "order created");
    Ok(OrderCommandResult {
        aggregate_id: order.id,
        version: order.version,
        records: vec![record],
    })
}

/// Handles the `ProcessPayment` command: records `PaymentReceived` against
/// the version the payer saw, taking a snapshot when `policy` asks for one.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::Validation` for a non-positive amount,
/// `DomainError::VersionConflict` if the order has moved past
/// `order_version`, and any store error.
#[instrument(skip(store), fields(order_id = command.order_id))]
pub async fn handle_process_payment(
    command: &ProcessPayment,
    policy: SnapshotPolicy,
    store: &dyn RecordStore,
) -> Result<OrderCommandResult, DomainError> {
    let mut order = load_existing(store, command.order_id).await?;
    let event = order.receive_payment(command.order_version, command.amount)?;

    let mut unit_of_work = store.begin().await?;
    let triggered =
        match trigger_event_with_policy(unit_of_work.as_mut(), &mut order, event, policy).await {
            Ok(triggered) => triggered,
            Err(err) => return Err(abort(unit_of_work.as_mut(), err).await),
        };
    unit_of_work.commit().await?;

    info!(amount = command.amount, remaining = order.total, "payment processed");
    let mut records = vec![triggered.event];
    records.extend(triggered.snapshot);
    Ok(OrderCommandResult {
        aggregate_id: order.id,
        version: order.version,
        records,
    })
}

/// Handles the `SnapshotOrder` command: captures the order's current state.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::DuplicateRecord` if a snapshot already exists at this
/// version, and any store error.
#[instrument(skip(store), fields(order_id = command.order_id))]
pub async fn handle_snapshot_order(
    command: &SnapshotOrder,
    store: &dyn RecordStore,
) -> Result<OrderCommandResult, DomainError> {
    let order = load_existing(store, command.order_id).await?;

    let mut unit_of_work = store.begin().await?;
    let record = match snapshot(unit_of_work.as_mut(), &order).await {
        Ok(record) => record,
        Err(err) => return Err(abort(unit_of_work.as_mut(), err).await),
    };
    unit_of_work.commit().await?;

    Ok(OrderCommandResult {
        aggregate_id: order.id,
        version: order.version,
        records: vec![record],
    })
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tally_core::record::RecordKind;
    use tally_test_support::{FailingRecordStore, FixedClock, InMemoryRecordStore, init_tracing};

    use super::*;

    async fn create(store: &InMemoryRecordStore, order_id: u64, total: i64) {
        handle_create_order(&CreateOrder { order_id, total }, store)
            .await
            .unwrap();
    }

    async fn pay(
        store: &InMemoryRecordStore,
        order_id: u64,
        order_version: u64,
        amount: i64,
    ) -> Result<OrderCommandResult, DomainError> {
        let command = ProcessPayment {
            order_id,
            order_version,
            amount,
        };
        handle_process_payment(&command, SnapshotPolicy::Never, store).await
    }

    #[tokio::test]
    async fn test_create_order_writes_one_event_at_version_zero() {
        // Arrange
        let store = InMemoryRecordStore::new();

        // Act
        let result = handle_create_order(&CreateOrder { order_id: 1, total: 100 }, &store)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.version, 1);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "Order.OrderCreated");
        assert_eq!(records[0].originator_id, 1);
        assert_eq!(records[0].originator_version, 0);
        assert_eq!(records[0].state, json!({"total": 100, "version": 0}));
    }

    #[tokio::test]
    async fn test_created_row_is_stamped_by_the_store() {
        // Arrange
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap();
        let store = InMemoryRecordStore::with_clock(Arc::new(FixedClock(at)));

        // Act
        let result = handle_create_order(&CreateOrder { order_id: 1, total: 100 }, &store)
            .await
            .unwrap();

        // Assert
        assert_eq!(result.records[0].timestamp, at);
    }

    #[tokio::test]
    async fn test_create_then_pay_writes_two_rows() {
        // Arrange
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;

        // Act
        let result = pay(&store, 1, 1, 50).await.unwrap();

        // Assert
        assert_eq!(result.version, 2);
        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].topic, "Order.PaymentReceived");
        assert_eq!(records[1].originator_version, 1);
        assert_eq!(records[1].state, json!({"amount": 50, "version": 1}));
    }

    #[tokio::test]
    async fn test_create_order_twice_is_a_conflict() {
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;

        let result = handle_create_order(&CreateOrder { order_id: 1, total: 5 }, &store).await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_create_order_rejects_negative_total_without_writing() {
        let store = InMemoryRecordStore::new();

        let result = handle_create_order(&CreateOrder { order_id: 1, total: -1 }, &store).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_stale_payment_is_rejected_and_nothing_is_written() {
        // Arrange
        init_tracing();
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;
        pay(&store, 1, 1, 50).await.unwrap();

        // Act
        let result = pay(&store, 1, 1, 50).await;

        // Assert
        match result.unwrap_err() {
            DomainError::VersionConflict {
                aggregate_id,
                expected,
                actual,
            } => {
                assert_eq!(aggregate_id, 1);
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_payment_for_unknown_order_is_not_found() {
        let store = InMemoryRecordStore::new();

        let result = pay(&store, 42, 0, 10).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(42))));
    }

    #[tokio::test]
    async fn test_non_positive_payment_is_rejected() {
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;

        let result = pay(&store, 1, 1, 0).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_payment_policy_snapshots_every_second_version() {
        // Arrange
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;
        let policy = SnapshotPolicy::EveryNEvents(NonZeroU64::new(2).unwrap());
        let command = ProcessPayment {
            order_id: 1,
            order_version: 1,
            amount: 25,
        };

        // Act
        let result = handle_process_payment(&command, policy, &store).await.unwrap();

        // Assert
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[1].kind, RecordKind::Snapshot);
        assert_eq!(result.records[1].originator_version, 2);
        assert_eq!(
            result.records[1].state,
            json!({"id": 1, "version": 2, "total": 75})
        );
    }

    #[tokio::test]
    async fn test_snapshot_order_captures_current_state() {
        // Arrange
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;
        pay(&store, 1, 1, 40).await.unwrap();

        // Act
        let result = handle_snapshot_order(&SnapshotOrder { order_id: 1 }, &store)
            .await
            .unwrap();

        // Assert
        let snapshot = &result.records[0];
        assert_eq!(snapshot.kind, RecordKind::Snapshot);
        assert_eq!(snapshot.topic, "Order");
        assert_eq!(snapshot.originator_version, 2);
        assert_eq!(snapshot.state, json!({"id": 1, "version": 2, "total": 60}));
    }

    #[tokio::test]
    async fn test_snapshot_twice_at_same_version_is_a_conflict() {
        let store = InMemoryRecordStore::new();
        create(&store, 1, 100).await;
        handle_snapshot_order(&SnapshotOrder { order_id: 1 }, &store)
            .await
            .unwrap();

        let result = handle_snapshot_order(&SnapshotOrder { order_id: 1 }, &store).await;

        assert!(matches!(result, Err(DomainError::DuplicateRecord { .. })));
    }

    #[tokio::test]
    async fn test_handlers_surface_store_failures() {
        let command = CreateOrder {
            order_id: 1,
            total: 1,
        };

        let result = handle_create_order(&command, &FailingRecordStore).await;

        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}

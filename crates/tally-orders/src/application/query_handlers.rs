//! Query handlers for the Orders context.
//!
//! Every query restores orders from the record log, at the latest state or
//! as they stood at an earlier version or instant, and returns read-only
//! views.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::batch::restore_many;
use tally_core::error::DomainError;
use tally_core::replay::{RestorePoint, restore_at, restore_latest};
use tally_core::store::RecordStore;

use crate::domain::aggregates::Order;

/// Read-only view of an order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: u64,
    /// Outstanding amount, in minor currency units.
    pub total: i64,
    /// Number of events applied. Zero means the order did not exist yet.
    pub version: u64,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            total: order.total,
            version: order.version,
        }
    }
}

/// Retrieves the current state of an order.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the order has no events.
pub async fn get_order(order_id: u64, store: &dyn RecordStore) -> Result<OrderView, DomainError> {
    let order: Order = restore_latest(store, order_id).await?;
    if order.version == 0 {
        return Err(DomainError::AggregateNotFound(order_id));
    }
    Ok(order.into())
}

/// Retrieves an order as it stood once its first `version` events had been
/// applied.
///
/// # Errors
///
/// Returns any store or replay error.
pub async fn get_order_at_version(
    order_id: u64,
    version: u64,
    store: &dyn RecordStore,
) -> Result<OrderView, DomainError> {
    let order: Order = restore_at(store, order_id, RestorePoint::Version(version)).await?;
    Ok(order.into())
}

/// Retrieves an order as it stood at `at`, inclusive.
///
/// # Errors
///
/// Returns any store or replay error.
pub async fn get_order_at(
    order_id: u64,
    at: DateTime<Utc>,
    store: &dyn RecordStore,
) -> Result<OrderView, DomainError> {
    let order: Order = restore_at(store, order_id, RestorePoint::Timestamp(at)).await?;
    Ok(order.into())
}

/// Retrieves several orders as they stood at `at`, inclusive, in two store
/// round trips.
///
/// # Errors
///
/// Returns any store or replay error.
pub async fn get_orders_at(
    order_ids: &BTreeSet<u64>,
    at: DateTime<Utc>,
    store: &dyn RecordStore,
) -> Result<BTreeMap<u64, OrderView>, DomainError> {
    let orders = restore_many::<Order>(store, order_ids, at).await?;
    Ok(orders
        .into_iter()
        .map(|(id, order)| (id, order.into()))
        .collect())
}

//! Aggregate roots for the Orders context.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tally_core::aggregate::Aggregate;
use tally_core::error::DomainError;
use tally_core::registry::EventRegistry;

use super::events::{
    ORDER_CREATED_EVENT_TYPE, OrderCreated, OrderEvent, OrderEventKind, PAYMENT_RECEIVED_EVENT_TYPE,
    PaymentReceived,
};

static ORDER_EVENTS: LazyLock<EventRegistry<OrderEvent>> = LazyLock::new(|| {
    EventRegistry::new(Order::AGGREGATE_TYPE)
        .register(ORDER_CREATED_EVENT_TYPE, |version, payload: OrderCreated| {
            OrderEvent {
                version,
                kind: OrderEventKind::OrderCreated(payload),
            }
        })
        .register(
            PAYMENT_RECEIVED_EVENT_TYPE,
            |version, payload: PaymentReceived| OrderEvent {
                version,
                kind: OrderEventKind::PaymentReceived(payload),
            },
        )
});

/// The aggregate root for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Aggregate identifier.
    pub id: u64,
    /// Number of events applied.
    pub version: u64,
    /// Outstanding amount, in minor currency units.
    pub total: i64,
}

impl Order {
    /// Builds the event that opens this order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `total` is negative.
    pub fn create(&self, total: i64) -> Result<OrderEvent, DomainError> {
        if total < 0 {
            return Err(DomainError::Validation(format!(
                "order {} cannot be created with negative total {total}",
                self.id
            )));
        }
        Ok(OrderEvent::created(self.version, total))
    }

    /// Builds the event recording a payment taken when the order was at
    /// `order_version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `amount` is not positive.
    pub fn receive_payment(
        &self,
        order_version: u64,
        amount: i64,
    ) -> Result<OrderEvent, DomainError> {
        if amount <= 0 {
            return Err(DomainError::Validation(format!(
                "payment against order {} must be positive, got {amount}",
                self.id
            )));
        }
        Ok(OrderEvent::payment_received(order_version, amount))
    }
}

impl Aggregate for Order {
    const AGGREGATE_TYPE: &'static str = "Order";
    type Event = OrderEvent;

    fn new(id: u64) -> Self {
        Self {
            id,
            version: 0,
            total: 0,
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

    fn event_registry() -> &'static EventRegistry<OrderEvent> {
        &ORDER_EVENTS
    }
}

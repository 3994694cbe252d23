//! Domain events for the Orders context.

use serde::{Deserialize, Serialize};
use tally_core::error::DomainError;
use tally_core::event::{DomainEvent, payload_with_version};

use super::aggregates::Order;

/// Event type of [`OrderCreated`].
pub const ORDER_CREATED_EVENT_TYPE: &str = "OrderCreated";

/// Event type of [`PaymentReceived`].
pub const PAYMENT_RECEIVED_EVENT_TYPE: &str = "PaymentReceived";

/// Emitted when an order is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// Amount owed, in minor currency units.
    pub total: i64,
}

/// Emitted when a payment is taken against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    /// Amount paid, in minor currency units.
    pub amount: i64,
}

/// Event payload variants for the Orders context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEventKind {
    /// The order has been opened.
    OrderCreated(OrderCreated),
    /// A payment has been received.
    PaymentReceived(PaymentReceived),
}

/// Domain event envelope for the Orders context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEvent {
    /// The order version this event was issued against.
    pub version: u64,
    /// Event-specific payload.
    pub kind: OrderEventKind,
}

impl OrderEvent {
    /// An `OrderCreated` event issued against `version`.
    #[must_use]
    pub fn created(version: u64, total: i64) -> Self {
        Self {
            version,
            kind: OrderEventKind::OrderCreated(OrderCreated { total }),
        }
    }

    /// A `PaymentReceived` event issued against `version`.
    #[must_use]
    pub fn payment_received(version: u64, amount: i64) -> Self {
        Self {
            version,
            kind: OrderEventKind::PaymentReceived(PaymentReceived { amount }),
        }
    }
}

impl DomainEvent for OrderEvent {
    type Aggregate = Order;

    fn event_type(&self) -> &'static str {
        match &self.kind {
            OrderEventKind::OrderCreated(_) => ORDER_CREATED_EVENT_TYPE,
            OrderEventKind::PaymentReceived(_) => PAYMENT_RECEIVED_EVENT_TYPE,
        }
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        match &self.kind {
            OrderEventKind::OrderCreated(payload) => payload_with_version(payload, self.version),
            OrderEventKind::PaymentReceived(payload) => {
                payload_with_version(payload, self.version)
            }
        }
    }

    fn apply(&self, order: &mut Order) {
        match &self.kind {
            OrderEventKind::OrderCreated(payload) => order.total = payload.total,
            OrderEventKind::PaymentReceived(payload) => order.total -= payload.amount,
        }
    }
}

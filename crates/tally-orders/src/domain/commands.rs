//! Commands for the Orders context.

/// Command to open an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order identifier, chosen by the caller.
    pub order_id: u64,
    /// Amount owed, in minor currency units.
    pub total: i64,
}

/// Command to take a payment against an order.
#[derive(Debug, Clone)]
pub struct ProcessPayment {
    /// The order identifier.
    pub order_id: u64,
    /// The order version the payer saw.
    pub order_version: u64,
    /// Amount paid, in minor currency units.
    pub amount: i64,
}

/// Command to capture a snapshot of an order's current state.
#[derive(Debug, Clone)]
pub struct SnapshotOrder {
    /// The order identifier.
    pub order_id: u64,
}

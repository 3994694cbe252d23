//! Command and query handlers for orders.

pub mod command_handlers;
pub mod query_handlers;

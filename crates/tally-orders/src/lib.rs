//! Tally — Orders bounded context.
//!
//! Orders are created with a total and paid down by payments. Every change
//! is an event in the shared record log, so any past state of an order can
//! be restored.

pub mod application;
pub mod domain;

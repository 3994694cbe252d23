//! Order aggregate, its events, and the commands that produce them.

pub mod aggregates;
pub mod commands;
pub mod events;

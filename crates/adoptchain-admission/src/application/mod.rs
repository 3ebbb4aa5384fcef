//! Handlers and the live deadline scheduler.

pub mod command_handlers;
pub mod query_handlers;
pub mod scheduler;

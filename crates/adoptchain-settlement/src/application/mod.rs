//! The event correlator, the orchestrator that consumes it, and token reads.

pub mod correlator;
pub mod orchestrator;
pub mod token_queries;

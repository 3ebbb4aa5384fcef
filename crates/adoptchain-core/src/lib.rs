//! Adoptchain Core: shared domain model and abstractions.
//!
//! This crate defines the pet record model, the error taxonomy, and the
//! seams (record store, chain gateway, clock) that every bounded context
//! depends on. It contains no infrastructure code.

pub mod chain;
pub mod clock;
pub mod error;
pub mod pet;
pub mod repository;

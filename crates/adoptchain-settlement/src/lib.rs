//! Adoption settlement: chain request orchestration and event correlation.
//!
//! Drives the two-phase on-chain workflow (oracle request, then
//! apply-for-adoption), matches the resulting contract logs back to the pet
//! that caused them, and commits the confirmed winner to the record store.
//! Ownership-token minting runs as a separate, owner-initiated workflow.

pub mod application;
pub mod domain;

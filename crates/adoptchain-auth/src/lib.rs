//! Adoption settlement: wallet signature sessions.
//!
//! Turns a wallet-signed message into a short-lived session credential and
//! validates that credential on every mutating call. Nothing is stored
//! server-side: a credential is valid exactly while its signature checks out
//! and its expiry has not passed.

pub mod application;
pub mod domain;

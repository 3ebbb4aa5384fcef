//! Session issuance and authorization.

pub mod auth_gate;

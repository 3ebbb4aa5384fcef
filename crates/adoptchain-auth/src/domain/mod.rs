//! Credential and signature primitives.

pub mod credential;
pub mod signature;

//! Adoption settlement: admission control and deadline scheduling.
//!
//! Decides who gets onto a pet's applicant roster, when a roster is ready to
//! be settled, and keeps live countdowns for observers waiting on a deadline.

pub mod application;
pub mod domain;

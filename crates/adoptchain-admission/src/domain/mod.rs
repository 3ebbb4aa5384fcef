//! Admission policy and deadline arithmetic.

pub mod admission;
pub mod commands;
pub mod deadline;

//! Settlement state machines and the owner-commit step.

pub mod commit;
pub mod state;

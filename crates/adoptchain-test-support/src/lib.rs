//! Shared test doubles and fixtures for the adoption settlement service.

mod chain;
mod clock;
mod fixtures;
mod repository;

pub use chain::ScriptedChainGateway;
pub use clock::{FixedClock, ManualClock};
pub use fixtures::{address, fixed_now, pet_fixture, pending_pet};
pub use repository::{FailingPetRepository, InMemoryPetRepository};

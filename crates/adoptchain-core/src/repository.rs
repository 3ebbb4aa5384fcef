//! Record store abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::pet::{Pet, PetId, PetStatus};

/// A read-modify-write step applied to a single pet record.
///
/// The closure runs while the record store holds the row exclusively. If it
/// returns an error nothing is written and the error is handed back to the
/// caller unchanged.
pub type PetMutation = Box<dyn FnOnce(&mut Pet) -> Result<(), DomainError> + Send>;

/// Repository trait for the durable pet table.
#[async_trait]
pub trait PetRepository: Send + Sync {
    /// Load a single pet.
    ///
    /// Returns `PersistenceError::NotFound` when no row has the id.
    async fn get(&self, id: PetId) -> Result<Pet, DomainError>;

    /// Load every pet, ordered by creation time ascending.
    async fn list(&self) -> Result<Vec<Pet>, DomainError>;

    /// Load every pet with the given status, ordered by creation time.
    async fn list_by_status(&self, status: PetStatus) -> Result<Vec<Pet>, DomainError>;

    /// Insert a new pet record and return it as stored.
    async fn insert(&self, pet: Pet) -> Result<Pet, DomainError>;

    /// Apply `mutation` to the pet under an exclusive row lock and persist
    /// the result. Concurrent calls for the same id are serialized.
    async fn modify(&self, id: PetId, mutation: PetMutation) -> Result<Pet, DomainError>;
}

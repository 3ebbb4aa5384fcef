//! Test repositories: `PetRepository` implementations for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use adoptchain_core::error::{DomainError, PersistenceError};
use adoptchain_core::pet::{Pet, PetId, PetStatus};
use adoptchain_core::repository::{PetMutation, PetRepository};
use async_trait::async_trait;

/// A pet repository held in memory. A single mutex serializes every
/// mutation, which upholds the same row-exclusivity contract as the
/// PostgreSQL store. Counts successful writes so tests can assert that a
/// commit happened exactly once.
#[derive(Debug, Default)]
pub struct InMemoryPetRepository {
    pets: Mutex<BTreeMap<PetId, Pet>>,
    writes: AtomicUsize,
}

impl InMemoryPetRepository {
    /// Create a repository seeded with `pets`.
    #[must_use]
    pub fn with_pets(pets: impl IntoIterator<Item = Pet>) -> Self {
        Self {
            pets: Mutex::new(pets.into_iter().map(|pet| (pet.id, pet)).collect()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `modify` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns a snapshot of a stored pet.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self, id: PetId) -> Option<Pet> {
        self.pets.lock().unwrap().get(&id).cloned()
    }
}

fn sorted(mut pets: Vec<Pet>) -> Vec<Pet> {
    pets.sort_by_key(|pet| (pet.created_at, pet.id));
    pets
}

#[async_trait]
impl PetRepository for InMemoryPetRepository {
    async fn get(&self, id: PetId) -> Result<Pet, DomainError> {
        self.pets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id).into())
    }

    async fn list(&self) -> Result<Vec<Pet>, DomainError> {
        Ok(sorted(self.pets.lock().unwrap().values().cloned().collect()))
    }

    async fn list_by_status(&self, status: PetStatus) -> Result<Vec<Pet>, DomainError> {
        Ok(sorted(
            self.pets
                .lock()
                .unwrap()
                .values()
                .filter(|pet| pet.status == status)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, pet: Pet) -> Result<Pet, DomainError> {
        self.pets.lock().unwrap().insert(pet.id, pet.clone());
        Ok(pet)
    }

    async fn modify(&self, id: PetId, mutation: PetMutation) -> Result<Pet, DomainError> {
        let mut pets = self.pets.lock().unwrap();
        let stored = pets.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;
        let mut working = stored.clone();
        mutation(&mut working)?;
        *stored = working.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(working)
    }
}

/// A pet repository that always returns a backend error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingPetRepository;

fn unavailable() -> DomainError {
    PersistenceError::Backend("connection refused".into()).into()
}

#[async_trait]
impl PetRepository for FailingPetRepository {
    async fn get(&self, _id: PetId) -> Result<Pet, DomainError> {
        Err(unavailable())
    }

    async fn list(&self) -> Result<Vec<Pet>, DomainError> {
        Err(unavailable())
    }

    async fn list_by_status(&self, _status: PetStatus) -> Result<Vec<Pet>, DomainError> {
        Err(unavailable())
    }

    async fn insert(&self, _pet: Pet) -> Result<Pet, DomainError> {
        Err(unavailable())
    }

    async fn modify(&self, _id: PetId, _mutation: PetMutation) -> Result<Pet, DomainError> {
        Err(unavailable())
    }
}

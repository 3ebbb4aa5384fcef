//! Query handlers for the admission context.
//!
//! These return read-only views that combine a stored pet with the
//! time-dependent parts of its application (remaining window, eligibility).

use adoptchain_core::clock::Clock;
use adoptchain_core::error::DomainError;
use adoptchain_core::pet::{Pet, PetId, PetStatus};
use adoptchain_core::repository::PetRepository;
use alloy_primitives::Address;
use serde::Serialize;

use crate::domain::admission::can_settle;
use crate::domain::deadline::{deadline, format_remaining, remaining_seconds};

/// A pet together with the current state of its application window.
#[derive(Debug, Clone, Serialize)]
pub struct PetApplicationView {
    #[serde(flatten)]
    pub pet: Pet,
    /// Unix second at which the window closes; `None` before the first
    /// application.
    pub deadline: Option<i64>,
    pub remaining_seconds: i64,
    pub remaining_display: String,
    pub can_settle: bool,
}

impl PetApplicationView {
    /// Builds the view of `pet` as of `now`.
    #[must_use]
    pub fn at(pet: Pet, now: i64) -> Self {
        let started = pet.application_start_time != 0;
        let remaining = if started {
            remaining_seconds(pet.application_start_time, now)
        } else {
            0
        };
        Self {
            deadline: started.then(|| deadline(pet.application_start_time)),
            remaining_seconds: remaining,
            remaining_display: format_remaining(remaining),
            can_settle: started && can_settle(&pet, now),
            pet,
        }
    }
}

/// Pets an address is involved with.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantOverview {
    pub address: Address,
    /// Pending pets the address holds a roster slot on.
    pub pending: Vec<Pet>,
    /// Adopted pets the address owns.
    pub adopted: Vec<Pet>,
}

/// Retrieves the application view for one pet.
///
/// # Errors
///
/// Returns `PersistenceError::NotFound` if the pet does not exist.
pub async fn get_application(
    pet_id: PetId,
    repo: &dyn PetRepository,
    clock: &dyn Clock,
) -> Result<PetApplicationView, DomainError> {
    let pet = repo.get(pet_id).await?;
    Ok(PetApplicationView::at(pet, clock.unix_seconds()))
}

/// Lists every pending pet with its window state, oldest first.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if the record store fails.
pub async fn list_pending_applications(
    repo: &dyn PetRepository,
    clock: &dyn Clock,
) -> Result<Vec<PetApplicationView>, DomainError> {
    let now = clock.unix_seconds();
    Ok(repo
        .list_by_status(PetStatus::Pending)
        .await?
        .into_iter()
        .map(|pet| PetApplicationView::at(pet, now))
        .collect())
}

/// Collects the pending applications and adopted pets of `address`.
///
/// # Errors
///
/// Returns `DomainError::Persistence` if the record store fails.
pub async fn applicant_overview(
    address: Address,
    repo: &dyn PetRepository,
) -> Result<ApplicantOverview, DomainError> {
    let mut pending = Vec::new();
    let mut adopted = Vec::new();
    for pet in repo.list().await? {
        match pet.status {
            PetStatus::Pending if pet.has_applicant(&address) => pending.push(pet),
            PetStatus::Adopted if pet.owner == Some(address) => adopted.push(pet),
            _ => {}
        }
    }
    Ok(ApplicantOverview {
        address,
        pending,
        adopted,
    })
}

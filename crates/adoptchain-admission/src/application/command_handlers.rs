//! Command handlers for the admission context.

use adoptchain_core::clock::Clock;
use adoptchain_core::error::DomainError;
use adoptchain_core::pet::Pet;
use adoptchain_core::repository::PetRepository;
use tracing::{info, warn};

use crate::domain::admission;
use crate::domain::commands::ApplyForPet;

/// Handles the `ApplyForPet` command: adds the applicant under the record
/// store's row lock, so racing applications near the last slot cannot
/// overfill the roster.
///
/// # Errors
///
/// Returns `DomainError::Admission` if the roster rejects the applicant and
/// `DomainError::Persistence` if the record cannot be loaded or written.
pub async fn handle_apply(
    command: &ApplyForPet,
    clock: &dyn Clock,
    repo: &dyn PetRepository,
) -> Result<Pet, DomainError> {
    let applicant = command.applicant;
    let now = clock.unix_seconds();

    let result = repo
        .modify(
            command.pet_id,
            Box::new(move |pet: &mut Pet| admission::apply(pet, applicant, now).map_err(Into::into)),
        )
        .await;

    match &result {
        Ok(pet) => info!(
            correlation_id = %command.correlation_id,
            pet_id = pet.id,
            %applicant,
            roster = pet.applicants.len(),
            "application accepted"
        ),
        Err(err) => warn!(
            correlation_id = %command.correlation_id,
            pet_id = command.pet_id,
            %applicant,
            error = %err,
            "application rejected"
        ),
    }
    result
}

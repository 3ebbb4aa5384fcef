//! Record-store mutations that finish a workflow.

use adoptchain_core::error::{DomainError, SettlementError};
use adoptchain_core::pet::{Pet, PetStatus};
use alloy_primitives::Address;

/// Commits `new_owner` as the pet's owner and closes its application:
/// status becomes `Adopted`, the roster is cleared and the start time reset.
///
/// # Errors
///
/// Returns `DomainError::SameOwner` if `new_owner` already owns the pet; the
/// pet is left unchanged.
pub fn commit_owner(pet: &mut Pet, new_owner: Address) -> Result<(), DomainError> {
    if pet.owner == Some(new_owner) {
        return Err(DomainError::SameOwner(pet.id));
    }
    pet.owner = Some(new_owner);
    pet.status = PetStatus::Adopted;
    pet.applicants.clear();
    pet.application_start_time = 0;
    Ok(())
}

/// Commits the winner of a settlement. The record must still be pending on
/// exactly the roster that was submitted on chain.
///
/// # Errors
///
/// Returns `SettlementError::RecordChanged` if the pet was committed or its
/// roster changed after the apply call; the pet is left unchanged.
pub fn commit_settlement(
    pet: &mut Pet,
    winner: Address,
    submitted_roster: &[Address],
) -> Result<(), DomainError> {
    if pet.status != PetStatus::Pending || pet.applicants != submitted_roster {
        return Err(SettlementError::RecordChanged(pet.id).into());
    }
    commit_owner(pet, winner)
}

/// Flags the pet's ownership token as minted.
pub fn mark_minted(pet: &mut Pet) {
    pet.has_nft = true;
}

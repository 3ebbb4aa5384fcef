//! Admission policy: roster capacity and settlement eligibility.

use adoptchain_core::error::AdmissionError;
use adoptchain_core::pet::{MAX_APPLICANTS, Pet, PetStatus};
use alloy_primitives::Address;

use super::deadline::deadline;

/// Returns `true` once the roster is full or the application window has
/// closed. This is the gate in front of every settlement request.
#[must_use]
pub fn can_settle(pet: &Pet, now: i64) -> bool {
    pet.applicants.len() >= MAX_APPLICANTS || now > deadline(pet.application_start_time)
}

/// Appends `applicant` to the roster.
///
/// The first successful application moves the pet to `Pending` and stamps
/// `application_start_time`; later applications leave both alone.
///
/// # Errors
///
/// - `AlreadyAdopted` if ownership has been committed.
/// - `DuplicateApplicant` if the address is already on the roster.
/// - `RosterFull` if the roster is at capacity.
///
/// On error `pet` is left unchanged.
pub fn apply(pet: &mut Pet, applicant: Address, now: i64) -> Result<(), AdmissionError> {
    if pet.status == PetStatus::Adopted {
        return Err(AdmissionError::AlreadyAdopted(pet.id));
    }
    if pet.has_applicant(&applicant) {
        return Err(AdmissionError::DuplicateApplicant(applicant));
    }
    if pet.roster_full() {
        return Err(AdmissionError::RosterFull(pet.id));
    }

    pet.applicants.push(applicant);
    if pet.status == PetStatus::Adoptable {
        pet.status = PetStatus::Pending;
    }
    if pet.application_start_time == 0 {
        pet.application_start_time = now;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deadline::WAIT_WINDOW_SECS;
    use adoptchain_test_support::{address, pending_pet, pet_fixture};

    const T0: i64 = 1_768_471_200;

    #[test]
    fn test_three_applications_fill_roster_and_enable_settlement() {
        // Arrange
        let mut pet = pet_fixture(1);
        let (x, y, z) = (address(0x0a), address(0x0b), address(0x0c));

        // Act / Assert
        apply(&mut pet, x, T0).unwrap();
        assert!(!can_settle(&pet, T0 + 1));
        apply(&mut pet, y, T0 + 10).unwrap();
        assert!(!can_settle(&pet, T0 + 11));
        apply(&mut pet, z, T0 + 20).unwrap();
        assert!(can_settle(&pet, T0 + 21));

        assert_eq!(pet.applicants, vec![x, y, z]);
        assert_eq!(pet.application_start_time, T0);
        assert_eq!(pet.status, PetStatus::Pending);
    }

    #[test]
    fn test_single_applicant_can_settle_after_window() {
        let mut pet = pet_fixture(1);
        apply(&mut pet, address(1), T0).unwrap();

        assert!(!can_settle(&pet, T0 + WAIT_WINDOW_SECS));
        assert!(can_settle(&pet, T0 + WAIT_WINDOW_SECS + 1));
    }

    #[test]
    fn test_can_settle_stays_true_as_time_passes() {
        let pet = pending_pet(1, vec![address(1)], T0);

        let first_true = (0..1_000)
            .map(|offset| T0 + offset)
            .find(|now| can_settle(&pet, *now))
            .unwrap();

        assert!((first_true..first_true + 10_000).all(|now| can_settle(&pet, now)));
    }

    #[test]
    fn test_duplicate_applicant_is_rejected_without_mutation() {
        let mut pet = pending_pet(1, vec![address(1)], T0);
        let before = pet.clone();

        let result = apply(&mut pet, address(1), T0 + 5);

        assert_eq!(result, Err(AdmissionError::DuplicateApplicant(address(1))));
        assert_eq!(pet, before);
    }

    #[test]
    fn test_duplicate_is_reported_even_when_full() {
        let mut pet = pending_pet(1, vec![address(1), address(2), address(3)], T0);

        assert_eq!(
            apply(&mut pet, address(2), T0),
            Err(AdmissionError::DuplicateApplicant(address(2)))
        );
    }

    #[test]
    fn test_full_roster_is_rejected() {
        let mut pet = pending_pet(1, vec![address(1), address(2), address(3)], T0);

        assert_eq!(
            apply(&mut pet, address(4), T0),
            Err(AdmissionError::RosterFull(1))
        );
        assert_eq!(pet.applicants.len(), MAX_APPLICANTS);
    }

    #[test]
    fn test_adopted_pet_rejects_applications() {
        let mut pet = pet_fixture(1);
        pet.status = PetStatus::Adopted;

        assert_eq!(
            apply(&mut pet, address(1), T0),
            Err(AdmissionError::AlreadyAdopted(1))
        );
        assert!(pet.applicants.is_empty());
    }
}

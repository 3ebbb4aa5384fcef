//! Domain error types.

use alloy_primitives::Address;
use thiserror::Error;

use crate::pet::PetId;

/// Rejections from the admission controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The address already holds a roster slot.
    #[error("address {0} already applied")]
    DuplicateApplicant(Address),

    /// The roster is at capacity.
    #[error("pet {0} already has the maximum number of applicants")]
    RosterFull(PetId),

    /// Ownership of the pet has already been committed.
    #[error("pet {0} has already been adopted")]
    AlreadyAdopted(PetId),
}

/// Session credential and signature failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The recovered signer does not match the claimed address.
    #[error("invalid signature")]
    InvalidSignature,

    /// No credential was presented.
    #[error("credential is required")]
    MissingCredential,

    /// The credential could not be decoded or its signature is not ours.
    #[error("invalid credential")]
    InvalidCredential,

    /// The credential's validity window has passed.
    #[error("credential expired")]
    ExpiredCredential,

    /// The credential was issued to a different address.
    #[error("credential does not belong to the claimed address")]
    AddressMismatch,

    /// The address is not on the operator allow-list.
    #[error("address {0} is not an operator")]
    NotOperator(Address),
}

/// Failures talking to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The call reverted during simulation.
    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    /// The transaction was mined with a failed status, or could not be sent.
    #[error("transaction reverted: {0}")]
    TransactionReverted(String),

    /// The required confirmation depth was never observed.
    #[error("confirmation timeout: {0}")]
    ConfirmationTimeout(String),

    /// The node connection or log subscription failed.
    #[error("chain transport error: {0}")]
    Transport(String),
}

/// Record store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// No record with the given id.
    #[error("pet {0} not found")]
    NotFound(PetId),

    /// A concurrent writer changed or removed the record.
    #[error("write conflict on pet {0}")]
    WriteConflict(PetId),

    /// The backing store is unavailable or returned malformed data.
    #[error("record store error: {0}")]
    Backend(String),
}

/// Rejections from the settlement orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// A settlement or mint for this pet is already in flight.
    #[error("a chain request for pet {0} is already in flight")]
    AlreadyInFlight(PetId),

    /// The pet does not satisfy the settlement predicate.
    #[error("pet {0} is not ready for settlement")]
    NotEligible(PetId),

    /// The requester does not own the pet.
    #[error("address {requester} does not own pet {pet_id}")]
    NotOwner {
        /// The pet being minted.
        pet_id: PetId,
        /// The address that asked.
        requester: Address,
    },

    /// The ownership token has already been minted.
    #[error("pet {0} already has an ownership token")]
    AlreadyMinted(PetId),

    /// No settlement has ever been started for the pet.
    #[error("no settlement recorded for pet {0}")]
    NotFound(PetId),

    /// The pet record no longer matches the roster the settlement submitted.
    #[error("pet {0} changed while its settlement was in flight")]
    RecordChanged(PetId),
}

/// Top-level domain error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    /// An ownership commit named the current owner.
    #[error("pet {0} is already owned by that address")]
    SameOwner(PetId),

    /// A validation error in request handling.
    #[error("validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors_convert_and_keep_their_message() {
        let err: DomainError = AdmissionError::RosterFull(7).into();

        assert!(matches!(
            err,
            DomainError::Admission(AdmissionError::RosterFull(7))
        ));
        assert_eq!(
            err.to_string(),
            "pet 7 already has the maximum number of applicants"
        );
    }
}

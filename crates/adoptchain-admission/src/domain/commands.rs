//! Commands for the admission context.

use adoptchain_core::pet::PetId;
use alloy_primitives::Address;
use uuid::Uuid;

/// Command to put an address on a pet's applicant roster.
#[derive(Debug, Clone)]
pub struct ApplyForPet {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The pet identifier.
    pub pet_id: PetId,
    /// The applying wallet.
    pub applicant: Address,
}

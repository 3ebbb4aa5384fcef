//! Pet and address fixtures.

use adoptchain_core::pet::{Pet, PetId, PetStatus, PetType};
use alloy_primitives::Address;
use chrono::{DateTime, TimeZone, Utc};

/// Fixed timestamp used across tests.
///
/// # Panics
///
/// Never; the literal date is valid.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// A deterministic address whose 20 bytes all equal `byte`.
#[must_use]
pub fn address(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// An adoptable pet with no applicants and no owner.
#[must_use]
pub fn pet_fixture(id: PetId) -> Pet {
    Pet {
        id,
        name: format!("cat {id}"),
        pet_type: PetType::Cat,
        breed: "Ragdoll".to_owned(),
        birth_date: "2024-03".to_owned(),
        image: format!("images/cat{id}.png"),
        description: "A cat".to_owned(),
        status: PetStatus::Adoptable,
        owner: None,
        applicants: Vec::new(),
        application_start_time: 0,
        token_uri: format!("ipfs://pets/{id}.json"),
        has_nft: false,
        created_at: fixed_now(),
    }
}

/// A pending pet with the given roster and start time.
#[must_use]
pub fn pending_pet(id: PetId, applicants: Vec<Address>, start_time: i64) -> Pet {
    Pet {
        status: PetStatus::Pending,
        applicants,
        application_start_time: start_time,
        ..pet_fixture(id)
    }
}

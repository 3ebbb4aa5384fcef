//! Pet record model owned by the record store.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a pet record. Also used as the on-chain pet id and token id.
pub type PetId = i64;

/// Maximum number of applicants a pet can hold.
pub const MAX_APPLICANTS: usize = 3;

/// Adoption status of a pet. Transitions only move forward:
/// `Adoptable -> Pending -> Adopted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetStatus {
    /// Open for applications, nobody has applied yet.
    Adoptable,
    /// At least one application is on the roster.
    Pending,
    /// Ownership has been committed.
    Adopted,
}

impl PetStatus {
    /// Returns the lowercase wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Adoptable => "adoptable",
            Self::Pending => "pending",
            Self::Adopted => "adopted",
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pet status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PetStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adoptable" => Ok(Self::Adoptable),
            "pending" => Ok(Self::Pending),
            "adopted" => Ok(Self::Adopted),
            _ => Err(UnknownStatus(s.to_owned())),
        }
    }
}

/// Kind of animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetType {
    Cat,
    Dog,
    Other,
}

/// A pet record. The record store is the sole source of truth for its
/// off-chain status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: PetType,
    pub breed: String,
    /// Birth month, `YYYY-MM`.
    pub birth_date: String,
    pub image: String,
    pub description: String,
    pub status: PetStatus,
    /// Committed owner. `None` until the first ownership commit.
    pub owner: Option<Address>,
    /// Applicants in application order. At most [`MAX_APPLICANTS`], no
    /// duplicates.
    pub applicants: Vec<Address>,
    /// Unix seconds of the first successful application, `0` when unset.
    pub application_start_time: i64,
    pub token_uri: String,
    #[serde(rename = "hasNFT")]
    pub has_nft: bool,
    pub created_at: DateTime<Utc>,
}

impl Pet {
    /// Returns `true` if `address` already holds a roster slot.
    #[must_use]
    pub fn has_applicant(&self, address: &Address) -> bool {
        self.applicants.contains(address)
    }

    /// Returns `true` once the roster has reached capacity.
    #[must_use]
    pub fn roster_full(&self) -> bool {
        self.applicants.len() >= MAX_APPLICANTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_case_insensitively() {
        assert_eq!("Pending".parse::<PetStatus>().unwrap(), PetStatus::Pending);
        assert_eq!("adopted".parse::<PetStatus>().unwrap(), PetStatus::Adopted);
        assert!("lost".parse::<PetStatus>().is_err());
    }

    #[test]
    fn test_pet_serializes_with_wire_field_names() {
        let pet = Pet {
            id: 4,
            name: "dog 1".to_owned(),
            pet_type: PetType::Dog,
            breed: "Shiba Inu".to_owned(),
            birth_date: "2024-03".to_owned(),
            image: "images/dog1.png".to_owned(),
            description: "A dog".to_owned(),
            status: PetStatus::Pending,
            owner: None,
            applicants: vec![Address::repeat_byte(0x11)],
            application_start_time: 1_700_000_000,
            token_uri: "ipfs://dog1".to_owned(),
            has_nft: false,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&pet).unwrap();

        assert_eq!(json["type"], "dog");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["hasNFT"], false);
        assert!(json["owner"].is_null());
        assert_eq!(json["applicants"].as_array().unwrap().len(), 1);
    }
}

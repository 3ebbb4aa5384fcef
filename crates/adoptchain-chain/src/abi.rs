//! The adoption contract's ABI surface.

use adoptchain_core::chain::{ChainEvent, ContractCall, EventName};
use adoptchain_core::error::ChainError;
use adoptchain_core::pet::PetId;
use alloy::primitives::{B256, Bytes, LogData, U256};
use alloy::sol_types::{SolCall, SolEvent};

alloy::sol! {
    interface IPetAdoption {
        function sendRequest(string[] args) external returns (bytes32);
        function applyForAdoption(uint256 petId, address[] _applicants) external;
        function safeMint(uint256 petId, string uri) external returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function tokenURI(uint256 tokenId) external view returns (string);

        event RecordPet(uint256 petId);
        event confirmWinner(address winner);
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

pub use IPetAdoption::{
    RecordPet, Transfer, applyForAdoptionCall, balanceOfCall, confirmWinner, safeMintCall,
    sendRequestCall, tokenOfOwnerByIndexCall, tokenURICall,
};

/// Converts a pet id to its on-chain `uint256`.
///
/// # Errors
///
/// Returns `ChainError::SimulationFailed` for negative ids, which the
/// contract cannot represent.
pub fn pet_id_to_u256(pet_id: PetId) -> Result<U256, ChainError> {
    u64::try_from(pet_id)
        .map(U256::from)
        .map_err(|_| ChainError::SimulationFailed(format!("pet id {pet_id} is negative")))
}

/// Converts an on-chain `uint256` back to a pet id, if it fits.
#[must_use]
pub fn u256_to_pet_id(value: U256) -> Option<PetId> {
    u64::try_from(value)
        .ok()
        .and_then(|value| PetId::try_from(value).ok())
}

/// ABI-encodes `call` as transaction input, selector included.
///
/// # Errors
///
/// Returns `ChainError::SimulationFailed` if a pet id cannot be encoded.
pub fn encode_call(call: &ContractCall) -> Result<Bytes, ChainError> {
    let input = match call {
        ContractCall::SendRequest { args } => sendRequestCall { args: args.clone() }.abi_encode(),
        ContractCall::ApplyForAdoption { pet_id, applicants } => applyForAdoptionCall {
            petId: pet_id_to_u256(*pet_id)?,
            _applicants: applicants.clone(),
        }
        .abi_encode(),
        ContractCall::SafeMint { pet_id, uri } => safeMintCall {
            petId: pet_id_to_u256(*pet_id)?,
            uri: uri.clone(),
        }
        .abi_encode(),
    };
    Ok(input.into())
}

/// Topic-0 of the contract event.
#[must_use]
pub fn event_signature(event: EventName) -> B256 {
    match event {
        EventName::RecordPet => RecordPet::SIGNATURE_HASH,
        EventName::ConfirmWinner => confirmWinner::SIGNATURE_HASH,
        EventName::Transfer => Transfer::SIGNATURE_HASH,
    }
}

/// Decodes a contract log. Returns `None` for logs of other events, logs
/// that do not decode, and token ids that do not fit a pet id.
#[must_use]
pub fn decode_log(data: &LogData) -> Option<ChainEvent> {
    let topic0 = *data.topics().first()?;
    if topic0 == RecordPet::SIGNATURE_HASH {
        let event = RecordPet::decode_log_data(data).ok()?;
        Some(ChainEvent::PetRecorded {
            pet_id: u256_to_pet_id(event.petId)?,
        })
    } else if topic0 == confirmWinner::SIGNATURE_HASH {
        let event = confirmWinner::decode_log_data(data).ok()?;
        Some(ChainEvent::WinnerConfirmed {
            winner: event.winner,
        })
    } else if topic0 == Transfer::SIGNATURE_HASH {
        let event = Transfer::decode_log_data(data).ok()?;
        Some(ChainEvent::Transfer {
            from: event.from,
            to: event.to,
            token_id: u256_to_pet_id(event.tokenId)?,
        })
    } else {
        None
    }
}

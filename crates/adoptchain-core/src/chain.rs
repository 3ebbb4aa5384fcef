//! Chain gateway abstraction.
//!
//! The adoption contract is consumed through a fixed ABI surface. This module
//! expresses that surface in domain terms so the settlement workflow never
//! handles raw calldata or log topics.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::ChainError;
use crate::pet::PetId;

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `sendRequest(string[])`: asks the oracle to record the pet.
    SendRequest {
        /// Oracle arguments; the pet id as a decimal string.
        args: Vec<String>,
    },
    /// `applyForAdoption(uint256,address[])`: asks the contract to pick a
    /// winner from the roster.
    ApplyForAdoption {
        pet_id: PetId,
        applicants: Vec<Address>,
    },
    /// `safeMint(uint256,string)`: mints the ownership token.
    SafeMint { pet_id: PetId, uri: String },
}

impl ContractCall {
    /// Returns the ABI function name, for logging.
    #[must_use]
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::SendRequest { .. } => "sendRequest",
            Self::ApplyForAdoption { .. } => "applyForAdoption",
            Self::SafeMint { .. } => "safeMint",
        }
    }
}

/// Contract events the service listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// `RecordPet(uint256 petId)`
    RecordPet,
    /// `confirmWinner(address winner)`
    ConfirmWinner,
    /// `Transfer(address,address,uint256)`
    Transfer,
}

/// A decoded contract log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    /// The oracle recorded a pet.
    PetRecorded { pet_id: PetId },
    /// The contract picked a winner.
    WinnerConfirmed { winner: Address },
    /// A token changed hands; a mint has `from == Address::ZERO`.
    Transfer {
        from: Address,
        to: Address,
        token_id: PetId,
    },
}

impl ChainEvent {
    /// Returns the contract event this log was decoded from.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::PetRecorded { .. } => EventName::RecordPet,
            Self::WinnerConfirmed { .. } => EventName::ConfirmWinner,
            Self::Transfer { .. } => EventName::Transfer,
        }
    }
}

/// A live stream of log batches. Each item is every matching log delivered
/// by one notification from the node.
pub type LogStream = BoxStream<'static, Vec<ChainEvent>>;

/// An ownership token held by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedToken {
    pub token_id: PetId,
    pub token_uri: String,
}

/// Gateway to the adoption contract.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Dry-run the call against the latest block.
    async fn simulate(&self, call: &ContractCall) -> Result<(), ChainError>;

    /// Sign and broadcast the call, returning the transaction hash once the
    /// node has accepted it.
    async fn submit(&self, call: &ContractCall) -> Result<B256, ChainError>;

    /// Wait until the transaction is mined successfully and buried under
    /// `confirmations` blocks (the inclusion block counts as the first).
    async fn await_confirmations(&self, tx_hash: B256, confirmations: u64)
    -> Result<(), ChainError>;

    /// Open a live subscription to the contract's logs for one event.
    async fn subscribe(&self, event: EventName) -> Result<LogStream, ChainError>;

    /// `balanceOf(owner)`
    async fn balance_of(&self, owner: Address) -> Result<u64, ChainError>;

    /// `tokenOfOwnerByIndex(owner, index)`
    async fn token_of_owner_by_index(&self, owner: Address, index: u64)
    -> Result<PetId, ChainError>;

    /// `tokenURI(tokenId)`
    async fn token_uri(&self, token_id: PetId) -> Result<String, ChainError>;
}

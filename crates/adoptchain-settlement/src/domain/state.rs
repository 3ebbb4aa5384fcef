//! Per-pet settlement and mint state machines.
//!
//! A phase that submits a transaction completes only once both of its
//! signals are in: the matching contract log and the confirmation depth of
//! the transaction. They may arrive in either order.

use alloy_primitives::{Address, B256};
use serde::Serialize;

/// Blocks required on the oracle request before it is final.
pub const ORACLE_REQUEST_CONFIRMATIONS: u64 = 6;

/// Blocks required on the apply-for-adoption transaction.
pub const APPLY_CONFIRMATIONS: u64 = 1;

/// Blocks required on the mint transaction.
pub const MINT_CONFIRMATIONS: u64 = 3;

/// Settlement progress for one pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SettlementState {
    Idle,
    /// The oracle request is being (or has been) submitted.
    RequestSent {
        tx_hash: Option<B256>,
        confirmed: bool,
        recorded: bool,
    },
    /// The oracle recorded the pet; the apply call is being prepared.
    Recorded,
    /// The apply-for-adoption call is being (or has been) submitted with
    /// `roster` as its applicants.
    ApplySent {
        tx_hash: Option<B256>,
        confirmed: bool,
        winner: Option<Address>,
        roster: Vec<Address>,
    },
    /// The winner is final on chain; the record store commit is running.
    WinnerConfirmed {
        winner: Address,
        roster: Vec<Address>,
    },
    Committed { owner: Address },
    Failed { reason: String },
}

impl SettlementState {
    /// A freshly dispatched oracle request.
    #[must_use]
    pub fn request_sent() -> Self {
        Self::RequestSent {
            tx_hash: None,
            confirmed: false,
            recorded: false,
        }
    }

    /// Returns `true` while a chain request for the pet is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, Self::Idle | Self::Committed { .. } | Self::Failed { .. })
    }

    /// The applicants submitted by the apply call, while its outcome is
    /// still pending.
    #[must_use]
    pub fn submitted_roster(&self) -> Option<&[Address]> {
        match self {
            Self::ApplySent { roster, .. } | Self::WinnerConfirmed { roster, .. } => Some(roster),
            _ => None,
        }
    }

    /// Short state name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestSent { .. } => "request_sent",
            Self::Recorded => "recorded",
            Self::ApplySent { .. } => "apply_sent",
            Self::WinnerConfirmed { .. } => "winner_confirmed",
            Self::Committed { .. } => "committed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Stores the hash of the transaction just submitted by the current
    /// phase. Returns `false` if the state moved on in the meantime.
    pub fn set_tx_hash(&mut self, hash: B256) -> bool {
        match self {
            Self::RequestSent { tx_hash, .. } | Self::ApplySent { tx_hash, .. } => {
                *tx_hash = Some(hash);
                true
            }
            _ => false,
        }
    }

    /// Notes the pet-recorded log. Returns `true` if this completed the
    /// oracle phase.
    pub fn note_recorded(&mut self) -> bool {
        let Self::RequestSent { recorded, .. } = self else {
            return false;
        };
        if *recorded {
            return false;
        }
        *recorded = true;
        self.complete_request()
    }

    /// Notes the oracle request's confirmation depth. Returns `true` if
    /// this completed the oracle phase.
    pub fn note_request_confirmed(&mut self) -> bool {
        let Self::RequestSent { confirmed, .. } = self else {
            return false;
        };
        if *confirmed {
            return false;
        }
        *confirmed = true;
        self.complete_request()
    }

    fn complete_request(&mut self) -> bool {
        if matches!(
            self,
            Self::RequestSent {
                confirmed: true,
                recorded: true,
                ..
            }
        ) {
            *self = Self::Recorded;
            true
        } else {
            false
        }
    }

    /// Moves `Recorded` to a freshly dispatched apply call for `roster`.
    /// Returns `false` if the state moved on in the meantime.
    pub fn begin_apply(&mut self, roster: Vec<Address>) -> bool {
        if *self != Self::Recorded {
            return false;
        }
        *self = Self::ApplySent {
            tx_hash: None,
            confirmed: false,
            winner: None,
            roster,
        };
        true
    }

    /// Notes the winner-confirmed log. Returns the winner if this completed
    /// the apply phase. Only the first winner is kept.
    pub fn note_winner(&mut self, address: Address) -> Option<Address> {
        let Self::ApplySent { winner, .. } = self else {
            return None;
        };
        if winner.is_some() {
            return None;
        }
        *winner = Some(address);
        self.complete_apply()
    }

    /// Notes the apply call's confirmation. Returns the winner if this
    /// completed the apply phase.
    pub fn note_apply_confirmed(&mut self) -> Option<Address> {
        let Self::ApplySent { confirmed, .. } = self else {
            return None;
        };
        if *confirmed {
            return None;
        }
        *confirmed = true;
        self.complete_apply()
    }

    fn complete_apply(&mut self) -> Option<Address> {
        let Self::ApplySent {
            confirmed: true,
            winner: Some(winner),
            roster,
            ..
        } = self
        else {
            return None;
        };
        let winner = *winner;
        let roster = std::mem::take(roster);
        *self = Self::WinnerConfirmed { winner, roster };
        Some(winner)
    }

    /// Moves any in-flight state to `Failed`. Returns `false` if the state
    /// was already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        *self = Self::Failed {
            reason: reason.into(),
        };
        true
    }
}

/// Ownership-token mint progress for one pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MintState {
    Submitted {
        tx_hash: Option<B256>,
        confirmed: bool,
        transferred: bool,
    },
    Minted,
    Failed { reason: String },
}

impl MintState {
    /// A freshly dispatched mint.
    #[must_use]
    pub fn submitted() -> Self {
        Self::Submitted {
            tx_hash: None,
            confirmed: false,
            transferred: false,
        }
    }

    /// Returns `true` while the mint transaction is outstanding.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    /// Stores the mint transaction hash. Returns `false` if the mint is no
    /// longer in flight.
    pub fn set_tx_hash(&mut self, hash: B256) -> bool {
        if let Self::Submitted { tx_hash, .. } = self {
            *tx_hash = Some(hash);
            true
        } else {
            false
        }
    }

    /// Notes the token transfer log. Returns `true` once both the log and
    /// the confirmation depth have been seen.
    pub fn note_transferred(&mut self) -> bool {
        match self {
            Self::Submitted {
                transferred,
                confirmed,
                ..
            } if !*transferred => {
                *transferred = true;
                *confirmed
            }
            _ => false,
        }
    }

    /// Notes the mint transaction's confirmation depth. Returns `true` once
    /// both signals have been seen.
    pub fn note_confirmed(&mut self) -> bool {
        match self {
            Self::Submitted {
                confirmed,
                transferred,
                ..
            } if !*confirmed => {
                *confirmed = true;
                *transferred
            }
            _ => false,
        }
    }

    /// Moves an in-flight mint to `Failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if !self.is_in_flight() {
            return false;
        }
        *self = Self::Failed {
            reason: reason.into(),
        };
        true
    }
}

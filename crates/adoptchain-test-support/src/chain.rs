//! Scripted chain gateway: a `ChainGateway` driven entirely by the test.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use adoptchain_core::chain::{
    ChainEvent, ChainGateway, ContractCall, EventName, LogStream, OwnedToken,
};
use adoptchain_core::error::ChainError;
use adoptchain_core::pet::PetId;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

/// A chain gateway whose outcomes are scripted by the test.
///
/// - Simulation succeeds unless a failure was scripted for the function.
/// - Every submission gets a fresh hash and is recorded.
/// - Confirmations resolve immediately, unless held with
///   [`hold_confirmations`](Self::hold_confirmations), and report a revert
///   for functions scripted with [`revert_on`](Self::revert_on).
/// - Logs are delivered only when the test calls [`emit`](Self::emit).
#[derive(Debug)]
pub struct ScriptedChainGateway {
    simulation_failures: Mutex<HashMap<&'static str, String>>,
    reverts: Mutex<HashSet<&'static str>>,
    submitted: Mutex<Vec<(B256, ContractCall)>>,
    confirmation_requests: Mutex<Vec<(B256, u64)>>,
    confirmations_open: watch::Sender<bool>,
    logs: HashMap<EventName, broadcast::Sender<Vec<ChainEvent>>>,
    tokens: Mutex<BTreeMap<Address, Vec<OwnedToken>>>,
}

impl Default for ScriptedChainGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChainGateway {
    /// Create a gateway where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        let logs = [
            EventName::RecordPet,
            EventName::ConfirmWinner,
            EventName::Transfer,
        ]
        .into_iter()
        .map(|name| (name, broadcast::channel(64).0))
        .collect();
        Self {
            simulation_failures: Mutex::new(HashMap::new()),
            reverts: Mutex::new(HashSet::new()),
            submitted: Mutex::new(Vec::new()),
            confirmation_requests: Mutex::new(Vec::new()),
            confirmations_open: watch::channel(true).0,
            logs,
            tokens: Mutex::new(BTreeMap::new()),
        }
    }

    /// Make simulation of `function` fail with `reason`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_simulation(&self, function: &'static str, reason: &str) {
        self.simulation_failures
            .lock()
            .unwrap()
            .insert(function, reason.to_owned());
    }

    /// Make transactions calling `function` report a failed receipt.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn revert_on(&self, function: &'static str) {
        self.reverts.lock().unwrap().insert(function);
    }

    /// Block every confirmation wait until [`release_confirmations`](Self::release_confirmations).
    pub fn hold_confirmations(&self) {
        self.confirmations_open.send_replace(false);
    }

    /// Let held and future confirmation waits resolve.
    pub fn release_confirmations(&self) {
        self.confirmations_open.send_replace(true);
    }

    /// Deliver one batch of logs to every live subscriber of the batch's
    /// events. Returns the number of subscribers reached.
    pub fn emit(&self, batch: Vec<ChainEvent>) -> usize {
        let Some(first) = batch.first() else {
            return 0;
        };
        self.logs
            .get(&first.name())
            .and_then(|sender| sender.send(batch).ok())
            .unwrap_or(0)
    }

    /// Register a token so the read calls can report it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn give_token(&self, owner: Address, token_id: PetId, token_uri: &str) {
        self.tokens.lock().unwrap().entry(owner).or_default().push(OwnedToken {
            token_id,
            token_uri: token_uri.to_owned(),
        });
    }

    /// All submitted calls, in submission order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn submitted_calls(&self) -> Vec<ContractCall> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// All `(tx_hash, confirmations)` waits requested so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn confirmation_requests(&self) -> Vec<(B256, u64)> {
        self.confirmation_requests.lock().unwrap().clone()
    }

    fn function_of(&self, tx_hash: B256) -> Option<&'static str> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .find(|(hash, _)| *hash == tx_hash)
            .map(|(_, call)| call.function_name())
    }
}

#[async_trait]
impl ChainGateway for ScriptedChainGateway {
    async fn simulate(&self, call: &ContractCall) -> Result<(), ChainError> {
        match self
            .simulation_failures
            .lock()
            .unwrap()
            .get(call.function_name())
        {
            Some(reason) => Err(ChainError::SimulationFailed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn submit(&self, call: &ContractCall) -> Result<B256, ChainError> {
        let mut submitted = self.submitted.lock().unwrap();
        let nonce = submitted.len() as u64 + 1;
        let hash = B256::left_padding_from(&nonce.to_be_bytes());
        submitted.push((hash, call.clone()));
        Ok(hash)
    }

    async fn await_confirmations(
        &self,
        tx_hash: B256,
        confirmations: u64,
    ) -> Result<(), ChainError> {
        self.confirmation_requests
            .lock()
            .unwrap()
            .push((tx_hash, confirmations));

        let mut open = self.confirmations_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let reverted = self
            .function_of(tx_hash)
            .is_some_and(|function| self.reverts.lock().unwrap().contains(function));
        if reverted {
            return Err(ChainError::TransactionReverted(format!("{tx_hash} reverted")));
        }
        Ok(())
    }

    async fn subscribe(&self, event: EventName) -> Result<LogStream, ChainError> {
        let receiver = self
            .logs
            .get(&event)
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| ChainError::Transport(format!("no log feed for {event:?}")))?;

        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(batch) => return Some((batch, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn balance_of(&self, owner: Address) -> Result<u64, ChainError> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .get(&owner)
            .map_or(0, |tokens| tokens.len() as u64))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: Address,
        index: u64,
    ) -> Result<PetId, ChainError> {
        self.tokens
            .lock()
            .unwrap()
            .get(&owner)
            .and_then(|tokens| tokens.get(usize::try_from(index).ok()?))
            .map(|token| token.token_id)
            .ok_or_else(|| ChainError::SimulationFailed("owner index out of bounds".into()))
    }

    async fn token_uri(&self, token_id: PetId) -> Result<String, ChainError> {
        self.tokens
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|token| token.token_id == token_id)
            .map(|token| token.token_uri.clone())
            .ok_or_else(|| ChainError::SimulationFailed("nonexistent token".into()))
    }
}

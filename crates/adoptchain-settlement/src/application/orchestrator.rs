//! The chain request orchestrator.
//!
//! Owns one settlement state machine and one mint state machine per pet id.
//! Chain steps (simulate, submit, wait for confirmations) run in spawned
//! tasks; their outcomes and every matched log arrive as [`Signal`]s on a
//! single queue, which a driver task applies to the state machines in
//! arrival order. Chain failures are logged where they happen and move the
//! machine to `Failed`; the pet record is never partially committed and
//! nothing is retried.
//!
//! The winner log names no pet, only an address. While one pet's apply call
//! is outstanding, another pet whose roster shares an applicant is held in
//! `Recorded` and only dispatched once the first leaves the apply phase.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use adoptchain_admission::application::scheduler::DeadlineScheduler;
use adoptchain_admission::domain::admission::can_settle;
use adoptchain_core::chain::{ChainEvent, ChainGateway, ContractCall};
use adoptchain_core::clock::Clock;
use adoptchain_core::error::{ChainError, DomainError, SettlementError};
use adoptchain_core::pet::{Pet, PetId, PetStatus};
use adoptchain_core::repository::PetRepository;
use alloy_primitives::{Address, B256};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use super::correlator::{CorrelationKey, EventCorrelator, LogFilter, Matched, WatchStage};
use crate::domain::commit::{commit_settlement, mark_minted};
use crate::domain::state::{
    APPLY_CONFIRMATIONS, MINT_CONFIRMATIONS, MintState, ORACLE_REQUEST_CONFIRMATIONS,
    SettlementState,
};

const SETTLEMENT_STAGES: [WatchStage; 2] = [WatchStage::OracleRecorded, WatchStage::WinnerConfirmed];
const MINT_STAGES: [WatchStage; 1] = [WatchStage::TokenTransferred];

/// Reason recorded when an operator aborts a settlement.
pub const ABORTED_BY_OPERATOR: &str = "aborted by operator";

#[derive(Debug)]
enum Signal {
    Matched(Matched),
    Confirmed(CorrelationKey),
    Failed {
        key: CorrelationKey,
        reason: String,
    },
    Stored {
        key: CorrelationKey,
        outcome: Result<(), DomainError>,
    },
}

impl From<Matched> for Signal {
    fn from(matched: Matched) -> Self {
        Self::Matched(matched)
    }
}

/// Outcome of claiming the apply phase for a recorded pet.
#[derive(Debug, PartialEq, Eq)]
enum ApplySlot {
    Started,
    Held { behind: PetId },
    Stale,
}

#[derive(Debug)]
struct Tracked<S> {
    attempt: u64,
    state: S,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives settlements and mints for every pet.
#[derive(Clone)]
pub struct SettlementOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SettlementOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementOrchestrator")
            .field("correlator", &self.inner.correlator)
            .finish_non_exhaustive()
    }
}

struct Inner {
    gateway: Arc<dyn ChainGateway>,
    repository: Arc<dyn PetRepository>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<DeadlineScheduler>,
    correlator: EventCorrelator,
    settlements: Mutex<HashMap<PetId, Tracked<SettlementState>>>,
    mints: Mutex<HashMap<PetId, Tracked<MintState>>>,
    // Apply steps waiting on an overlapping roster. Locked after `settlements`.
    held: Mutex<Vec<CorrelationKey>>,
    attempts: AtomicU64,
    signals: mpsc::UnboundedSender<Signal>,
}

impl SettlementOrchestrator {
    /// Creates the orchestrator and starts its driver task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        repository: Arc<dyn PetRepository>,
        clock: Arc<dyn Clock>,
        scheduler: Arc<DeadlineScheduler>,
    ) -> Self {
        let (signals, queue) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            correlator: EventCorrelator::new(Arc::clone(&gateway)),
            gateway,
            repository,
            clock,
            scheduler,
            settlements: Mutex::new(HashMap::new()),
            mints: Mutex::new(HashMap::new()),
            held: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(1),
            signals,
        });
        tokio::spawn(drive(Arc::downgrade(&inner), queue));
        Self { inner }
    }

    /// Starts settling `pet_id`: the pet must be pending with a non-empty
    /// roster that satisfies the settlement predicate, and no chain request
    /// may be in flight for it. The chain steps run in the background;
    /// progress is visible through [`state`](Self::state).
    ///
    /// # Errors
    ///
    /// - `PersistenceError::NotFound` if the pet does not exist.
    /// - `SettlementError::NotEligible` if the pet cannot be settled yet.
    /// - `SettlementError::AlreadyInFlight` if a settlement is running.
    #[instrument(skip(self))]
    pub async fn settle(&self, pet_id: PetId) -> Result<SettlementState, DomainError> {
        let pet = self.inner.repository.get(pet_id).await?;
        let now = self.inner.clock.unix_seconds();
        if pet.status != PetStatus::Pending
            || pet.applicants.is_empty()
            || !can_settle(&pet, now)
        {
            return Err(SettlementError::NotEligible(pet_id).into());
        }

        let key = self.inner.reserve_settlement(pet_id)?;
        info!(pet_id, attempt = key.attempt, roster = pet.applicants.len(), "settlement started");
        tokio::spawn(Arc::clone(&self.inner).run(key));
        Ok(SettlementState::request_sent())
    }

    /// Current settlement state of `pet_id`; `Idle` if none was started.
    #[must_use]
    pub fn state(&self, pet_id: PetId) -> SettlementState {
        lock(&self.inner.settlements)
            .get(&pet_id)
            .map_or(SettlementState::Idle, |tracked| tracked.state.clone())
    }

    /// Stops an in-flight settlement: the machine moves to `Failed` and its
    /// log watches are cancelled. A settlement that already finished is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SettlementError::NotFound` if no settlement was ever started
    /// for the pet.
    pub fn abort(&self, pet_id: PetId) -> Result<SettlementState, SettlementError> {
        let mut settlements = lock(&self.inner.settlements);
        let tracked = settlements
            .get_mut(&pet_id)
            .ok_or(SettlementError::NotFound(pet_id))?;
        let aborted = tracked.state.fail(ABORTED_BY_OPERATOR);
        let state = tracked.state.clone();
        if aborted {
            self.inner.correlator.cancel_for(pet_id, &SETTLEMENT_STAGES);
            warn!(pet_id, attempt = tracked.attempt, "settlement aborted by operator");
        }
        drop(settlements);
        if aborted {
            self.inner.release_held();
        }
        Ok(state)
    }

    /// Starts minting the ownership token of an adopted pet on behalf of its
    /// owner.
    ///
    /// # Errors
    ///
    /// - `PersistenceError::NotFound` if the pet does not exist.
    /// - `SettlementError::NotOwner` if `requester` is not the committed owner.
    /// - `SettlementError::AlreadyMinted` if the token exists.
    /// - `SettlementError::AlreadyInFlight` if a mint is running.
    #[instrument(skip(self))]
    pub async fn mint_ownership_token(
        &self,
        pet_id: PetId,
        requester: Address,
    ) -> Result<MintState, DomainError> {
        let pet = self.inner.repository.get(pet_id).await?;
        if pet.status != PetStatus::Adopted || pet.owner != Some(requester) {
            return Err(SettlementError::NotOwner { pet_id, requester }.into());
        }
        if pet.has_nft {
            return Err(SettlementError::AlreadyMinted(pet_id).into());
        }

        let key = self.inner.reserve_mint(pet_id)?;
        info!(pet_id, attempt = key.attempt, "mint started");
        tokio::spawn(Arc::clone(&self.inner).run(key));
        Ok(MintState::submitted())
    }

    /// Current mint state of `pet_id`, if a mint was ever started.
    #[must_use]
    pub fn mint_state(&self, pet_id: PetId) -> Option<MintState> {
        lock(&self.inner.mints)
            .get(&pet_id)
            .map(|tracked| tracked.state.clone())
    }

    /// Number of log watches still waiting for a match.
    #[must_use]
    pub fn active_watches(&self) -> usize {
        self.inner.correlator.active_count()
    }
}

async fn drive(inner: Weak<Inner>, mut queue: mpsc::UnboundedReceiver<Signal>) {
    while let Some(signal) = queue.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle(signal);
    }
}

impl Inner {
    fn reserve_settlement(&self, pet_id: PetId) -> Result<CorrelationKey, SettlementError> {
        let mut settlements = lock(&self.settlements);
        if settlements
            .get(&pet_id)
            .is_some_and(|tracked| tracked.state.is_in_flight())
        {
            return Err(SettlementError::AlreadyInFlight(pet_id));
        }
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        settlements.insert(
            pet_id,
            Tracked {
                attempt,
                state: SettlementState::request_sent(),
            },
        );
        Ok(CorrelationKey {
            pet_id,
            attempt,
            stage: WatchStage::OracleRecorded,
        })
    }

    fn reserve_mint(&self, pet_id: PetId) -> Result<CorrelationKey, SettlementError> {
        let mut mints = lock(&self.mints);
        match mints.get(&pet_id).map(|tracked| &tracked.state) {
            Some(MintState::Minted) => return Err(SettlementError::AlreadyMinted(pet_id)),
            Some(state) if state.is_in_flight() => {
                return Err(SettlementError::AlreadyInFlight(pet_id));
            }
            _ => {}
        }
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        mints.insert(
            pet_id,
            Tracked {
                attempt,
                state: MintState::submitted(),
            },
        );
        Ok(CorrelationKey {
            pet_id,
            attempt,
            stage: WatchStage::TokenTransferred,
        })
    }

    fn with_settlement<R>(
        &self,
        key: CorrelationKey,
        f: impl FnOnce(&mut SettlementState) -> R,
    ) -> Option<R> {
        let mut settlements = lock(&self.settlements);
        let tracked = settlements
            .get_mut(&key.pet_id)
            .filter(|tracked| tracked.attempt == key.attempt)?;
        Some(f(&mut tracked.state))
    }

    fn with_mint<R>(&self, key: CorrelationKey, f: impl FnOnce(&mut MintState) -> R) -> Option<R> {
        let mut mints = lock(&self.mints);
        let tracked = mints
            .get_mut(&key.pet_id)
            .filter(|tracked| tracked.attempt == key.attempt)?;
        Some(f(&mut tracked.state))
    }

    /// Moves a recorded pet into the apply phase unless another pet whose
    /// submitted roster overlaps `roster` is still there; such a pet is
    /// parked until [`release_held`](Self::release_held).
    fn claim_apply(&self, key: CorrelationKey, roster: &[Address]) -> ApplySlot {
        let mut settlements = lock(&self.settlements);
        let blocking = settlements.iter().find_map(|(pet_id, tracked)| {
            let other = tracked.state.submitted_roster()?;
            (*pet_id != key.pet_id && other.iter().any(|address| roster.contains(address)))
                .then_some(*pet_id)
        });
        let Some(tracked) = settlements
            .get_mut(&key.pet_id)
            .filter(|tracked| tracked.attempt == key.attempt)
        else {
            return ApplySlot::Stale;
        };
        if tracked.state != SettlementState::Recorded {
            return ApplySlot::Stale;
        }
        if let Some(behind) = blocking {
            lock(&self.held).push(key);
            return ApplySlot::Held { behind };
        }
        tracked.state.begin_apply(roster.to_vec());
        ApplySlot::Started
    }

    /// Re-dispatches every held apply step; each one claims its slot again.
    fn release_held(self: &Arc<Self>) {
        let held = std::mem::take(&mut *lock(&self.held));
        for key in held {
            tokio::spawn(Arc::clone(self).run(key));
        }
    }

    fn is_current(&self, key: CorrelationKey) -> bool {
        match key.stage {
            WatchStage::TokenTransferred => self.with_mint(key, |state| state.is_in_flight()),
            _ => self.with_settlement(key, |state| state.is_in_flight()),
        }
        .unwrap_or(false)
    }

    fn signal(&self, signal: Signal) {
        // The driver only stops once the orchestrator is gone.
        let _ = self.signals.send(signal);
    }

    // ---- chain steps ----

    async fn run(self: Arc<Self>, key: CorrelationKey) {
        let result = match key.stage {
            WatchStage::OracleRecorded => self.request_oracle(key).await,
            WatchStage::WinnerConfirmed => self.apply_for_adoption(key).await,
            WatchStage::TokenTransferred => self.mint(key).await,
        };
        if let Err(err) = result {
            error!(
                pet_id = key.pet_id,
                attempt = key.attempt,
                stage = key.stage.as_str(),
                error = %err,
                "chain step failed"
            );
            self.signal(Signal::Failed {
                key,
                reason: err.to_string(),
            });
        }
    }

    async fn request_oracle(&self, key: CorrelationKey) -> Result<(), DomainError> {
        let watch = self
            .correlator
            .watch(
                key,
                LogFilter::PetRecorded { pet_id: key.pet_id },
                self.signals.clone(),
            )
            .await?;
        let call = ContractCall::SendRequest {
            args: vec![key.pet_id.to_string()],
        };
        let Some(tx_hash) = self.dispatch(key, &call).await? else {
            self.correlator.cancel(&watch);
            return Ok(());
        };
        self.gateway
            .await_confirmations(tx_hash, ORACLE_REQUEST_CONFIRMATIONS)
            .await?;
        self.signal(Signal::Confirmed(key));
        Ok(())
    }

    async fn apply_for_adoption(&self, key: CorrelationKey) -> Result<(), DomainError> {
        let pet = self.repository.get(key.pet_id).await?;
        if pet.applicants.is_empty() {
            return Err(DomainError::Validation(format!(
                "pet {} has no applicants",
                pet.id
            )));
        }

        let watch = self
            .correlator
            .watch(
                key,
                LogFilter::WinnerAmong {
                    candidates: pet.applicants.clone(),
                },
                self.signals.clone(),
            )
            .await?;
        match self.claim_apply(key, &pet.applicants) {
            ApplySlot::Started => {}
            ApplySlot::Held { behind } => {
                self.correlator.cancel(&watch);
                info!(
                    pet_id = key.pet_id,
                    behind,
                    "apply held until the overlapping roster settles"
                );
                return Ok(());
            }
            ApplySlot::Stale => {
                self.correlator.cancel(&watch);
                return Ok(());
            }
        }

        let call = ContractCall::ApplyForAdoption {
            pet_id: pet.id,
            applicants: pet.applicants,
        };
        let Some(tx_hash) = self.dispatch(key, &call).await? else {
            self.correlator.cancel(&watch);
            return Ok(());
        };
        self.gateway
            .await_confirmations(tx_hash, APPLY_CONFIRMATIONS)
            .await?;
        self.signal(Signal::Confirmed(key));
        Ok(())
    }

    async fn mint(&self, key: CorrelationKey) -> Result<(), DomainError> {
        let pet = self.repository.get(key.pet_id).await?;
        let watch = self
            .correlator
            .watch(
                key,
                LogFilter::Minted { token_id: pet.id },
                self.signals.clone(),
            )
            .await?;
        let call = ContractCall::SafeMint {
            pet_id: pet.id,
            uri: pet.token_uri,
        };
        let Some(tx_hash) = self.dispatch(key, &call).await? else {
            self.correlator.cancel(&watch);
            return Ok(());
        };
        self.gateway
            .await_confirmations(tx_hash, MINT_CONFIRMATIONS)
            .await?;
        self.signal(Signal::Confirmed(key));
        Ok(())
    }

    /// Simulates then submits `call`. Returns `None` if the workflow was
    /// aborted before the transaction could be attached to it.
    async fn dispatch(
        &self,
        key: CorrelationKey,
        call: &ContractCall,
    ) -> Result<Option<B256>, ChainError> {
        self.gateway.simulate(call).await?;
        if !self.is_current(key) {
            return Ok(None);
        }

        let tx_hash = self.gateway.submit(call).await?;
        let attached = match key.stage {
            WatchStage::TokenTransferred => self.with_mint(key, |state| state.set_tx_hash(tx_hash)),
            _ => self.with_settlement(key, |state| state.set_tx_hash(tx_hash)),
        }
        .unwrap_or(false);

        if attached {
            info!(
                pet_id = key.pet_id,
                function = call.function_name(),
                %tx_hash,
                "transaction submitted"
            );
            Ok(Some(tx_hash))
        } else {
            warn!(
                pet_id = key.pet_id,
                function = call.function_name(),
                %tx_hash,
                "transaction submitted after its workflow was aborted"
            );
            Ok(None)
        }
    }

    // ---- signal handling ----

    fn handle(self: &Arc<Self>, signal: Signal) {
        match signal {
            Signal::Matched(Matched { key, event }) => self.on_log(key, &event),
            Signal::Confirmed(key) => self.on_confirmed(key),
            Signal::Failed { key, reason } => self.on_failed(key, &reason),
            Signal::Stored { key, outcome } => self.on_stored(key, outcome),
        }
    }

    fn on_log(self: &Arc<Self>, key: CorrelationKey, event: &ChainEvent) {
        match (key.stage, event) {
            (WatchStage::OracleRecorded, ChainEvent::PetRecorded { .. }) => {
                info!(pet_id = key.pet_id, "oracle recorded pet");
                if self.with_settlement(key, SettlementState::note_recorded) == Some(true) {
                    self.start_apply(key);
                }
            }
            (WatchStage::WinnerConfirmed, ChainEvent::WinnerConfirmed { winner }) => {
                info!(pet_id = key.pet_id, %winner, "winner announced");
                let winner = *winner;
                self.finish_apply(key, |state| state.note_winner(winner));
            }
            (WatchStage::TokenTransferred, ChainEvent::Transfer { to, .. }) => {
                info!(pet_id = key.pet_id, %to, "ownership token transferred");
                if self.with_mint(key, MintState::note_transferred) == Some(true) {
                    self.record_mint(key);
                }
            }
            (stage, event) => warn!(
                pet_id = key.pet_id,
                stage = stage.as_str(),
                ?event,
                "log does not fit its watch"
            ),
        }
    }

    fn on_confirmed(self: &Arc<Self>, key: CorrelationKey) {
        match key.stage {
            WatchStage::OracleRecorded => {
                if self.with_settlement(key, SettlementState::note_request_confirmed) == Some(true)
                {
                    self.start_apply(key);
                }
            }
            WatchStage::WinnerConfirmed => {
                self.finish_apply(key, SettlementState::note_apply_confirmed);
            }
            WatchStage::TokenTransferred => {
                if self.with_mint(key, MintState::note_confirmed) == Some(true) {
                    self.record_mint(key);
                }
            }
        }
    }

    fn on_failed(self: &Arc<Self>, key: CorrelationKey, reason: &str) {
        let (failed, stages) = match key.stage {
            WatchStage::TokenTransferred => (
                self.with_mint(key, |state| state.fail(reason)),
                &MINT_STAGES[..],
            ),
            _ => (
                self.with_settlement(key, |state| state.fail(reason)),
                &SETTLEMENT_STAGES[..],
            ),
        };
        if failed == Some(true) {
            self.correlator.cancel_for(key.pet_id, stages);
            warn!(
                pet_id = key.pet_id,
                stage = key.stage.as_str(),
                reason,
                "workflow failed; pet record left unchanged"
            );
            if key.stage != WatchStage::TokenTransferred {
                self.release_held();
            }
        }
    }

    fn on_stored(self: &Arc<Self>, key: CorrelationKey, outcome: Result<(), DomainError>) {
        if let Err(err) = outcome {
            error!(pet_id = key.pet_id, error = %err, "record store commit failed");
            self.on_failed(key, &err.to_string());
            return;
        }

        if key.stage == WatchStage::TokenTransferred {
            self.with_mint(key, |state| {
                if state.is_in_flight() {
                    *state = MintState::Minted;
                }
            });
            info!(pet_id = key.pet_id, "ownership token recorded");
            return;
        }

        let committed = self.with_settlement(key, |state| {
            let SettlementState::WinnerConfirmed { winner, .. } = *state else {
                return None;
            };
            *state = SettlementState::Committed { owner: winner };
            Some(winner)
        });
        if let Some(Some(owner)) = committed {
            self.correlator.cancel_for(key.pet_id, &SETTLEMENT_STAGES);
            self.scheduler.cancel(key.pet_id);
            info!(pet_id = key.pet_id, %owner, "ownership committed");
            self.release_held();
        }
    }

    fn start_apply(self: &Arc<Self>, key: CorrelationKey) {
        let key = CorrelationKey {
            stage: WatchStage::WinnerConfirmed,
            ..key
        };
        tokio::spawn(Arc::clone(self).run(key));
    }

    /// Applies `step` to the apply phase; once it yields the winner, commits
    /// it against the roster that was submitted.
    fn finish_apply(
        self: &Arc<Self>,
        key: CorrelationKey,
        step: impl FnOnce(&mut SettlementState) -> Option<Address>,
    ) {
        let completed = self.with_settlement(key, |state| {
            let winner = step(state)?;
            Some((winner, state.submitted_roster()?.to_vec()))
        });
        if let Some(Some((winner, roster))) = completed {
            self.commit(key, winner, roster);
        }
    }

    fn commit(self: &Arc<Self>, key: CorrelationKey, winner: Address, roster: Vec<Address>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner
                .repository
                .modify(
                    key.pet_id,
                    Box::new(move |pet: &mut Pet| commit_settlement(pet, winner, &roster)),
                )
                .await
                .map(|_| ());
            inner.signal(Signal::Stored { key, outcome });
        });
    }

    fn record_mint(self: &Arc<Self>, key: CorrelationKey) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner
                .repository
                .modify(
                    key.pet_id,
                    Box::new(|pet: &mut Pet| {
                        mark_minted(pet);
                        Ok(())
                    }),
                )
                .await
                .map(|_| ());
            inner.signal(Signal::Stored { key, outcome });
        });
    }
}

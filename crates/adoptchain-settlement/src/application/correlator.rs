//! The event correlator.
//!
//! A watch opens a live log subscription for one contract event and tests
//! every log of every batch against its filter. The first matching log is
//! delivered once to the watch's sink and the subscription is dropped.
//! Delivery is claimed by removing the watch from the active registry, so a
//! watch that has been cancelled never delivers, and a watch never delivers
//! twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use adoptchain_core::chain::{ChainEvent, ChainGateway, EventName};
use adoptchain_core::error::ChainError;
use adoptchain_core::pet::PetId;
use alloy_primitives::Address;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Which signal a watch is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchStage {
    OracleRecorded,
    WinnerConfirmed,
    TokenTransferred,
}

impl WatchStage {
    /// Stage name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OracleRecorded => "oracle_recorded",
            Self::WinnerConfirmed => "winner_confirmed",
            Self::TokenTransferred => "token_transferred",
        }
    }
}

/// Identifies the request a log is matched back to. The pet id is the chain
/// correlation key; `attempt` tells successive requests for the same pet
/// apart locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub pet_id: PetId,
    pub attempt: u64,
    pub stage: WatchStage,
}

/// Log filters, one per watched contract event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    /// `RecordPet` for this pet.
    PetRecorded { pet_id: PetId },
    /// `confirmWinner` naming one of the candidates. The event carries no
    /// pet id, so the roster is the only thing to match on.
    WinnerAmong { candidates: Vec<Address> },
    /// A mint `Transfer` of this token.
    Minted { token_id: PetId },
}

impl LogFilter {
    /// The contract event this filter applies to.
    #[must_use]
    pub fn event_name(&self) -> EventName {
        match self {
            Self::PetRecorded { .. } => EventName::RecordPet,
            Self::WinnerAmong { .. } => EventName::ConfirmWinner,
            Self::Minted { .. } => EventName::Transfer,
        }
    }

    /// Returns `true` if `event` satisfies the filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        match (self, event) {
            (Self::PetRecorded { pet_id }, ChainEvent::PetRecorded { pet_id: logged }) => {
                pet_id == logged
            }
            (Self::WinnerAmong { candidates }, ChainEvent::WinnerConfirmed { winner }) => {
                candidates.contains(winner)
            }
            (
                Self::Minted { token_id },
                ChainEvent::Transfer {
                    from,
                    token_id: logged,
                    ..
                },
            ) => from.is_zero() && token_id == logged,
            _ => false,
        }
    }
}

/// A log that satisfied a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    pub key: CorrelationKey,
    pub event: ChainEvent,
}

/// Handle to a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    key: CorrelationKey,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn key(&self) -> CorrelationKey {
        self.key
    }
}

#[derive(Debug)]
struct ActiveWatch {
    key: CorrelationKey,
    task: AbortHandle,
}

type Registry = Arc<Mutex<HashMap<u64, ActiveWatch>>>;

fn claim(registry: &Registry, id: u64) -> Option<ActiveWatch> {
    registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
}

/// Matches contract logs to in-flight requests.
pub struct EventCorrelator {
    gateway: Arc<dyn ChainGateway>,
    active: Registry,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCorrelator")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl EventCorrelator {
    #[must_use]
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self {
            gateway,
            active: Arc::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a subscription for `filter` and delivers the first matching log
    /// to `sink`, exactly once. The subscription is live when this returns,
    /// so a transaction submitted afterwards cannot have its log missed.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Transport` if the log subscription cannot be
    /// opened.
    pub async fn watch<T>(
        &self,
        key: CorrelationKey,
        filter: LogFilter,
        sink: mpsc::UnboundedSender<T>,
    ) -> Result<SubscriptionHandle, ChainError>
    where
        T: From<Matched> + Send + 'static,
    {
        let mut logs = self.gateway.subscribe(filter.event_name()).await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.active);

        // Register under the lock so the task cannot claim itself before
        // it is registered.
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(async move {
            while let Some(batch) = logs.next().await {
                let Some(event) = batch.into_iter().find(|event| filter.matches(event)) else {
                    continue;
                };
                if claim(&registry, id).is_some() {
                    debug!(
                        pet_id = key.pet_id,
                        stage = key.stage.as_str(),
                        "log matched"
                    );
                    let _ = sink.send(T::from(Matched { key, event }));
                }
                return;
            }
            if claim(&registry, id).is_some() {
                warn!(
                    pet_id = key.pet_id,
                    stage = key.stage.as_str(),
                    "log subscription closed before a match"
                );
            }
        });
        active.insert(
            id,
            ActiveWatch {
                key,
                task: task.abort_handle(),
            },
        );
        drop(active);

        debug!(pet_id = key.pet_id, stage = key.stage.as_str(), "watch registered");
        Ok(SubscriptionHandle { id, key })
    }

    /// Cancels one watch. Returns `false` if it had already matched or been
    /// cancelled.
    pub fn cancel(&self, handle: &SubscriptionHandle) -> bool {
        match claim(&self.active, handle.id) {
            Some(watch) => {
                watch.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every watch of `pet_id` waiting for one of `stages`. Returns
    /// how many were cancelled.
    pub fn cancel_for(&self, pet_id: PetId, stages: &[WatchStage]) -> usize {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<u64> = active
            .iter()
            .filter(|(_, watch)| watch.key.pet_id == pet_id && stages.contains(&watch.key.stage))
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(watch) = active.remove(id) {
                watch.task.abort();
            }
        }
        ids.len()
    }

    /// Number of watches still waiting for a match.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

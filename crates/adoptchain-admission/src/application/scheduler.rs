//! Live per-pet countdowns.
//!
//! Each observer that attaches to a pet whose window closes soon gets its own
//! one-second ticker. A ticker ends when it reaches zero (after announcing
//! the eligibility change), when its observer detaches, or when the pet is
//! committed and the scheduler cancels every ticker for it. Tickers never
//! touch the settlement workflow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use adoptchain_core::clock::Clock;
use adoptchain_core::pet::PetId;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::domain::deadline::{is_soon, remaining_seconds};

const TICK: Duration = Duration::from_secs(1);
const OBSERVER_BUFFER: usize = 8;

/// A countdown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountdownEvent {
    /// One second elapsed.
    Tick { pet_id: PetId, remaining: i64 },
    /// The window closed; the pet can now be settled on time grounds.
    EligibilityChanged { pet_id: PetId },
}

type Registry = Arc<Mutex<HashMap<PetId, HashMap<u64, AbortHandle>>>>;

fn unregister(registry: &Registry, pet_id: PetId, id: u64) -> Option<AbortHandle> {
    let mut countdowns = registry.lock().unwrap_or_else(PoisonError::into_inner);
    let per_pet = countdowns.get_mut(&pet_id)?;
    let handle = per_pet.remove(&id);
    if per_pet.is_empty() {
        countdowns.remove(&pet_id);
    }
    handle
}

/// An observer's attachment to one pet's countdown. Dropping it detaches
/// the observer and stops its ticker.
#[derive(Debug)]
pub struct Countdown {
    pet_id: PetId,
    id: u64,
    initial_remaining: i64,
    events: mpsc::Receiver<CountdownEvent>,
    registry: Registry,
}

impl Countdown {
    /// The pet being counted down.
    #[must_use]
    pub fn pet_id(&self) -> PetId {
        self.pet_id
    }

    /// Seconds remaining when the observer attached.
    #[must_use]
    pub fn initial_remaining(&self) -> i64 {
        self.initial_remaining
    }

    /// Waits for the next event. Returns `None` once the countdown has
    /// finished or been cancelled.
    pub async fn next(&mut self) -> Option<CountdownEvent> {
        self.events.recv().await
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        if let Some(handle) = unregister(&self.registry, self.pet_id, self.id) {
            handle.abort();
            debug!(pet_id = self.pet_id, "countdown observer detached");
        }
    }
}

/// Owns every live countdown, keyed by pet id.
pub struct DeadlineScheduler {
    clock: Arc<dyn Clock>,
    countdowns: Registry,
    next_id: AtomicU64,
}

impl std::fmt::Debug for DeadlineScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineScheduler")
            .field("countdowns", &self.countdowns)
            .finish_non_exhaustive()
    }
}

impl DeadlineScheduler {
    /// Creates a scheduler reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            countdowns: Arc::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attaches an observer to the countdown of a window opened at
    /// `start_time`. Returns `None` when the window is not closing soon
    /// (already closed, never opened, or more than an hour away).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn watch(&self, pet_id: PetId, start_time: i64) -> Option<Countdown> {
        if start_time == 0 {
            return None;
        }
        let remaining = remaining_seconds(start_time, self.clock.unix_seconds());
        if !is_soon(remaining) {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, events) = mpsc::channel(OBSERVER_BUFFER);
        let registry = Arc::clone(&self.countdowns);

        // Hold the registry while spawning so the task cannot unregister
        // before it has been registered.
        let mut countdowns = self
            .countdowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(run_ticker(
            pet_id,
            id,
            remaining,
            sender,
            Arc::clone(&registry),
        ));
        countdowns
            .entry(pet_id)
            .or_default()
            .insert(id, task.abort_handle());
        drop(countdowns);

        debug!(pet_id, remaining, "countdown observer attached");
        Some(Countdown {
            pet_id,
            id,
            initial_remaining: remaining,
            events,
            registry,
        })
    }

    /// Stops every countdown for `pet_id`. Returns how many were stopped.
    pub fn cancel(&self, pet_id: PetId) -> usize {
        let handles = self
            .countdowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pet_id)
            .unwrap_or_default();
        for handle in handles.values() {
            handle.abort();
        }
        if !handles.is_empty() {
            debug!(pet_id, stopped = handles.len(), "countdowns cancelled");
        }
        handles.len()
    }

    /// Number of live countdowns for `pet_id`.
    #[must_use]
    pub fn active(&self, pet_id: PetId) -> usize {
        self.countdowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pet_id)
            .map_or(0, HashMap::len)
    }
}

async fn run_ticker(
    pet_id: PetId,
    id: u64,
    mut remaining: i64,
    sender: mpsc::Sender<CountdownEvent>,
    registry: Registry,
) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while remaining > 0 {
        ticker.tick().await;
        remaining -= 1;
        if remaining > 0 {
            // A slow observer misses intermediate ticks, never the final ones.
            let _ = sender.try_send(CountdownEvent::Tick { pet_id, remaining });
        }
    }

    let _ = sender
        .send(CountdownEvent::Tick {
            pet_id,
            remaining: 0,
        })
        .await;
    let _ = sender
        .send(CountdownEvent::EligibilityChanged { pet_id })
        .await;
    unregister(&registry, pet_id, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use adoptchain_test_support::{FixedClock, fixed_now};

    fn scheduler() -> DeadlineScheduler {
        DeadlineScheduler::new(Arc::new(FixedClock(fixed_now())))
    }

    fn started_secs_ago(secs: i64) -> i64 {
        fixed_now().timestamp() - secs
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_to_zero_then_signals_once() {
        // Arrange: 97 of 100 seconds elapsed.
        let scheduler = scheduler();
        let mut countdown = scheduler.watch(7, started_secs_ago(97)).unwrap();

        // Act
        let mut events = Vec::new();
        while let Some(event) = countdown.next().await {
            events.push(event);
        }

        // Assert
        assert_eq!(countdown.initial_remaining(), 3);
        assert_eq!(
            events,
            vec![
                CountdownEvent::Tick { pet_id: 7, remaining: 2 },
                CountdownEvent::Tick { pet_id: 7, remaining: 1 },
                CountdownEvent::Tick { pet_id: 7, remaining: 0 },
                CountdownEvent::EligibilityChanged { pet_id: 7 },
            ]
        );
        assert_eq!(scheduler.active(7), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_countdown_for_closed_or_unstarted_window() {
        let scheduler = scheduler();

        assert!(scheduler.watch(1, started_secs_ago(100)).is_none());
        assert!(scheduler.watch(1, 0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detaching_one_observer_leaves_others_running() {
        // Arrange
        let scheduler = scheduler();
        let first = scheduler.watch(3, started_secs_ago(10)).unwrap();
        let mut second = scheduler.watch(3, started_secs_ago(10)).unwrap();
        assert_eq!(scheduler.active(3), 2);

        // Act
        drop(first);

        // Assert
        assert_eq!(scheduler.active(3), 1);
        assert_eq!(
            second.next().await,
            Some(CountdownEvent::Tick { pet_id: 3, remaining: 89 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_every_observer_of_the_pet() {
        // Arrange
        let scheduler = scheduler();
        let mut a = scheduler.watch(5, started_secs_ago(50)).unwrap();
        let mut b = scheduler.watch(5, started_secs_ago(50)).unwrap();
        let mut other = scheduler.watch(6, started_secs_ago(50)).unwrap();

        // Act
        let stopped = scheduler.cancel(5);

        // Assert
        assert_eq!(stopped, 2);
        assert_eq!(a.next().await, None);
        assert_eq!(b.next().await, None);
        assert!(other.next().await.is_some());
        assert_eq!(scheduler.cancel(5), 0);
    }
}

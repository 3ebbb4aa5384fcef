//! Shared application state.

use std::fmt;
use std::sync::Arc;

use adoptchain_admission::application::scheduler::DeadlineScheduler;
use adoptchain_auth::application::auth_gate::AuthGate;
use adoptchain_core::chain::ChainGateway;
use adoptchain_core::clock::Clock;
use adoptchain_core::repository::PetRepository;
use adoptchain_settlement::application::orchestrator::SettlementOrchestrator;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The pet record store.
    pub repository: Arc<dyn PetRepository>,
    /// Clock used for admission timestamps and window checks.
    pub clock: Arc<dyn Clock>,
    /// Session issuer and validator.
    pub auth: Arc<AuthGate>,
    /// The adoption contract, for read-only token queries.
    pub gateway: Arc<dyn ChainGateway>,
    /// Live countdowns for pets whose window closes soon.
    pub scheduler: Arc<DeadlineScheduler>,
    /// Settlement and mint workflows.
    pub orchestrator: SettlementOrchestrator,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("auth", &self.auth)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state, wiring the scheduler and orchestrator
    /// to the given collaborators.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        repository: Arc<dyn PetRepository>,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn ChainGateway>,
        auth: AuthGate,
    ) -> Self {
        let scheduler = Arc::new(DeadlineScheduler::new(Arc::clone(&clock)));
        let orchestrator = SettlementOrchestrator::new(
            Arc::clone(&gateway),
            Arc::clone(&repository),
            Arc::clone(&clock),
            Arc::clone(&scheduler),
        );
        Self {
            repository,
            clock,
            auth: Arc::new(auth),
            gateway,
            scheduler,
            orchestrator,
        }
    }
}

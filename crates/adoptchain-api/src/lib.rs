//! Adoption settlement API: the record API, application views, operator
//! settlement endpoints and token queries over HTTP.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router. Middleware layers are added by the
/// binary.
pub fn app(state: AppState) -> Router {
    routes::router().with_state(state)
}

//! Route modules organized by concern.

pub mod applications;
pub mod health;
pub mod records;
pub mod settlements;
pub mod tokens;

use adoptchain_auth::application::auth_gate::extract_bearer;
use adoptchain_core::error::DomainError;
use alloy_primitives::Address;
use axum::Router;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::state::AppState;

/// Legacy header some clients still send the credential in.
const LEGACY_BEARER_HEADER: &str = "bearer";

/// Returns every route, without middleware layers.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(records::router())
        .nest("/applications", applications::router())
        .nest("/settlements", settlements::router())
        .nest("/tokens", tokens::router())
}

/// The session credential presented with a request, from `Authorization`
/// or the legacy `bearer` header.
fn credential(headers: &HeaderMap) -> Option<&str> {
    [AUTHORIZATION.as_str(), LEGACY_BEARER_HEADER]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .find_map(extract_bearer)
}

fn parse_address(raw: &str) -> Result<Address, DomainError> {
    raw.trim()
        .parse()
        .map_err(|_| DomainError::Validation(format!("{raw} is not an address")))
}

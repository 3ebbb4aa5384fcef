//! Ownership token listing.

use adoptchain_core::chain::OwnedToken;
use adoptchain_settlement::application::token_queries;
use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use serde::Deserialize;
use tracing::instrument;

use super::parse_address;
use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /tokens.
#[derive(Debug, Deserialize)]
pub struct TokensQuery {
    pub owner: String,
}

/// GET /tokens?owner=
#[instrument(skip(state))]
async fn owned_tokens(
    State(state): State<AppState>,
    Query(query): Query<TokensQuery>,
) -> Result<Json<Vec<OwnedToken>>, ApiError> {
    let owner = parse_address(&query.owner)?;
    let tokens = token_queries::owned_tokens(owner, &*state.gateway).await?;
    Ok(Json(tokens))
}

/// Returns the router for token queries.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(owned_tokens))
}

//! The record API: pet listings and the action-dispatched mutation endpoint.

use adoptchain_admission::application::command_handlers;
use adoptchain_admission::domain::commands::ApplyForPet;
use adoptchain_core::error::{DomainError, SettlementError};
use adoptchain_core::pet::{Pet, PetId, PetStatus, UnknownStatus};
use adoptchain_settlement::domain::commit::{commit_owner, mark_minted};
use alloy_primitives::Address;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::credential;
use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /records. `id` wins over `status`.
#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub id: Option<String>,
    pub status: Option<String>,
}

/// One record or a list, depending on the query.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecordsResponse {
    One(Box<Pet>),
    Many(Vec<Pet>),
}

/// Body of POST /records, dispatched on `action`.
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum RecordAction {
    #[serde(rename = "auth")]
    Auth {
        address: Address,
        message: String,
        signature: String,
    },
    #[serde(rename = "adopt", rename_all = "camelCase")]
    Adopt { address: Address, pet_id: PetId },
    #[serde(rename = "updateNFT", rename_all = "camelCase")]
    UpdateNft { pet_id: PetId },
    #[serde(rename = "updateOwner", rename_all = "camelCase")]
    UpdateOwner {
        address: Address,
        pet_id: PetId,
        new_owner: Address,
    },
}

/// Response to a successful `auth` action.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub message: &'static str,
    pub jsonwebtoken: String,
    pub expires_at: i64,
}

/// GET /records
#[instrument(skip(state))]
async fn get_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<RecordsResponse>, ApiError> {
    if let Some(raw) = query.id.as_deref().filter(|raw| !raw.is_empty()) {
        let id: PetId = raw
            .parse()
            .map_err(|_| DomainError::Validation(format!("id {raw} is not an integer")))?;
        let pet = state.repository.get(id).await?;
        return Ok(Json(RecordsResponse::One(Box::new(pet))));
    }
    if let Some(raw) = query.status.as_deref().filter(|raw| !raw.is_empty()) {
        let status: PetStatus = raw
            .parse()
            .map_err(|e: UnknownStatus| DomainError::Validation(e.to_string()))?;
        let pets = state.repository.list_by_status(status).await?;
        return Ok(Json(RecordsResponse::Many(pets)));
    }
    Ok(Json(RecordsResponse::Many(state.repository.list().await?)))
}

/// POST /records
///
/// Malformed JSON is reported as a `ValidationError`, like an unknown action.
#[instrument(skip_all)]
async fn post_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let action: RecordAction =
        serde_json::from_slice(&body).map_err(|e| DomainError::Validation(e.to_string()))?;

    match action {
        RecordAction::Auth {
            address,
            message,
            signature,
        } => {
            let session = state.auth.issue_session(address, &message, &signature)?;
            info!(%address, "session issued");
            Ok(Json(SessionResponse {
                message: "Valid signature",
                jsonwebtoken: session.token,
                expires_at: session.expires_at.timestamp(),
            })
            .into_response())
        }
        RecordAction::Adopt { address, pet_id } => {
            let command = ApplyForPet {
                correlation_id: Uuid::new_v4(),
                pet_id,
                applicant: address,
            };
            info!(correlation_id = %command.correlation_id, pet_id, "handling adopt action");
            let pet = command_handlers::handle_apply(
                &command,
                state.clock.as_ref(),
                &*state.repository,
            )
            .await?;
            Ok(Json(pet).into_response())
        }
        RecordAction::UpdateNft { pet_id } => {
            let pet = state
                .repository
                .modify(
                    pet_id,
                    Box::new(|pet: &mut Pet| {
                        mark_minted(pet);
                        Ok(())
                    }),
                )
                .await?;
            info!(pet_id, "ownership token flag set");
            Ok(Json(pet).into_response())
        }
        RecordAction::UpdateOwner {
            address,
            pet_id,
            new_owner,
        } => {
            state.auth.authorize(credential(&headers), address)?;
            if state.orchestrator.state(pet_id).is_in_flight() {
                return Err(SettlementError::AlreadyInFlight(pet_id).into());
            }
            let pet = state
                .repository
                .modify(pet_id, Box::new(move |pet: &mut Pet| commit_owner(pet, new_owner)))
                .await?;
            state.scheduler.cancel(pet_id);
            info!(pet_id, %new_owner, "owner committed");
            Ok(Json(pet).into_response())
        }
    }
}

/// Returns the router for the record API.
pub fn router() -> Router<AppState> {
    Router::new().route("/records", get(get_records).post(post_record))
}

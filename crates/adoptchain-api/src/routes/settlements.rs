//! Operator endpoints for the settlement workflow and owner-initiated
//! ownership token mints.

use adoptchain_core::pet::PetId;
use adoptchain_settlement::domain::state::{MintState, SettlementState};
use alloy_primitives::Address;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::credential;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body naming the caller, checked against the bearer credential.
#[derive(Debug, Deserialize)]
pub struct CallerRequest {
    pub address: Address,
}

/// Both workflows of one pet.
#[derive(Debug, Serialize)]
pub struct WorkflowResponse {
    pub pet_id: PetId,
    pub settlement: SettlementState,
    pub mint: Option<MintState>,
}

/// POST /settlements/{pet_id}
#[instrument(skip(state, headers, request), fields(address = %request.address))]
async fn settle(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
    headers: HeaderMap,
    Json(request): Json<CallerRequest>,
) -> Result<(StatusCode, Json<SettlementState>), ApiError> {
    state
        .auth
        .authorize_operator(credential(&headers), request.address)?;
    let settlement = state.orchestrator.settle(pet_id).await?;
    info!(pet_id, "settlement accepted");
    Ok((StatusCode::ACCEPTED, Json(settlement)))
}

/// GET /settlements/{pet_id}
async fn workflow(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
) -> Json<WorkflowResponse> {
    Json(WorkflowResponse {
        pet_id,
        settlement: state.orchestrator.state(pet_id),
        mint: state.orchestrator.mint_state(pet_id),
    })
}

/// POST /settlements/{pet_id}/abort
#[instrument(skip(state, headers, request), fields(address = %request.address))]
async fn abort(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
    headers: HeaderMap,
    Json(request): Json<CallerRequest>,
) -> Result<Json<SettlementState>, ApiError> {
    state
        .auth
        .authorize_operator(credential(&headers), request.address)?;
    let settlement = state.orchestrator.abort(pet_id)?;
    Ok(Json(settlement))
}

/// POST /settlements/{pet_id}/mint
#[instrument(skip(state, headers, request), fields(address = %request.address))]
async fn mint(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
    headers: HeaderMap,
    Json(request): Json<CallerRequest>,
) -> Result<(StatusCode, Json<MintState>), ApiError> {
    let owner = state
        .auth
        .authorize(credential(&headers), request.address)?;
    let minting = state.orchestrator.mint_ownership_token(pet_id, owner).await?;
    info!(pet_id, "mint accepted");
    Ok((StatusCode::ACCEPTED, Json(minting)))
}

/// Returns the router for settlement endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{pet_id}", post(settle).get(workflow))
        .route("/{pet_id}/abort", post(abort))
        .route("/{pet_id}/mint", post(mint))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use adoptchain_auth::application::auth_gate::AuthGate;
    use adoptchain_core::pet::PetStatus;
    use adoptchain_test_support::{
        FixedClock, InMemoryPetRepository, ScriptedChainGateway, address, fixed_now, pending_pet,
        pet_fixture,
    };
    use alloy::signers::SignerSync;
    use alloy::signers::local::PrivateKeySigner;
    use alloy_primitives::hex;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const MESSAGE: &str = "Operator sign-in";

    struct Fixture {
        state: AppState,
        gateway: Arc<ScriptedChainGateway>,
        operator: Address,
        token: String,
    }

    fn fixture(pets: Vec<adoptchain_core::pet::Pet>, operators: Vec<Address>) -> Fixture {
        let signer: PrivateKeySigner = KEY.parse().unwrap();
        let operator = signer.address();
        let signature = signer.sign_message_sync(MESSAGE.as_bytes()).unwrap();
        let clock = Arc::new(FixedClock(fixed_now()));
        let gateway = Arc::new(ScriptedChainGateway::new());
        let auth = AuthGate::new(b"settlement-secret", clock.clone()).with_operators(operators);
        let token = auth
            .issue_session(operator, MESSAGE, &hex::encode_prefixed(signature.as_bytes()))
            .unwrap()
            .token;
        let state = AppState::new(
            Arc::new(InMemoryPetRepository::with_pets(pets)),
            clock,
            gateway.clone(),
            auth,
        );
        Fixture {
            state,
            gateway,
            operator,
            token,
        }
    }

    fn full_roster_pet() -> adoptchain_core::pet::Pet {
        pending_pet(1, vec![address(1), address(2), address(3)], fixed_now().timestamp() - 10)
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router()
            .with_state(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    fn post(uri: &str, address: Address, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
            .body(Body::from(
                serde_json::to_vec(&json!({ "address": address })).unwrap(),
            ))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn wait_until(what: &str, check: impl Fn() -> bool) {
        for _ in 0..400 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn test_settle_without_credential_returns_401() {
        let f = fixture(vec![full_roster_pet()], vec![]);

        let (status, json) = send(&f.state, post("/1", f.operator, None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "MissingCredential");
        assert!(f.gateway.submitted_calls().is_empty());
    }

    #[tokio::test]
    async fn test_settle_by_non_operator_returns_403() {
        let f = fixture(vec![full_roster_pet()], vec![address(9)]);

        let (status, json) = send(&f.state, post("/1", f.operator, Some(&f.token))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "NotOperator");
    }

    #[tokio::test]
    async fn test_settle_is_accepted_once_then_conflicts() {
        // Arrange
        let f = fixture(vec![full_roster_pet()], vec![]);
        f.gateway.hold_confirmations();

        // Act
        let (first_status, first) = send(&f.state, post("/1", f.operator, Some(&f.token))).await;
        let (second_status, second) = send(&f.state, post("/1", f.operator, Some(&f.token))).await;

        // Assert
        assert_eq!(first_status, StatusCode::ACCEPTED);
        assert_eq!(first["state"], "request_sent");
        assert_eq!(second_status, StatusCode::CONFLICT);
        assert_eq!(second["error"], "AlreadyInFlight");
    }

    #[tokio::test]
    async fn test_settle_ineligible_pet_returns_400() {
        let pet = pending_pet(1, vec![address(1)], fixed_now().timestamp() - 10);
        let f = fixture(vec![pet], vec![]);

        let (status, json) = send(&f.state, post("/1", f.operator, Some(&f.token))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "NotEligible");
    }

    #[tokio::test]
    async fn test_workflow_reports_idle_for_untouched_pet() {
        let f = fixture(vec![pet_fixture(2)], vec![]);

        let (status, json) = send(&f.state, get("/2")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["settlement"]["state"], "idle");
        assert!(json["mint"].is_null());
    }

    #[tokio::test]
    async fn test_abort_fails_in_flight_settlement() {
        // Arrange
        let f = fixture(vec![full_roster_pet()], vec![]);
        f.gateway.hold_confirmations();
        send(&f.state, post("/1", f.operator, Some(&f.token))).await;

        // Act
        let (status, json) = send(&f.state, post("/1/abort", f.operator, Some(&f.token))).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "aborted by operator");
        wait_until("watches released", || f.state.orchestrator.active_watches() == 0).await;
    }

    #[tokio::test]
    async fn test_abort_of_unknown_settlement_returns_400() {
        let f = fixture(vec![pet_fixture(2)], vec![]);

        let (status, json) = send(&f.state, post("/2/abort", f.operator, Some(&f.token))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "SettlementNotFound");
    }

    #[tokio::test]
    async fn test_mint_by_owner_is_accepted_and_by_others_rejected() {
        // Arrange
        let f = fixture(vec![pet_fixture(2), pet_fixture(3)], vec![address(9)]);
        for id in [2, 3] {
            let owner = if id == 2 { f.operator } else { address(5) };
            f.state
                .repository
                .modify(
                    id,
                    Box::new(move |pet: &mut adoptchain_core::pet::Pet| {
                        pet.status = PetStatus::Adopted;
                        pet.owner = Some(owner);
                        Ok(())
                    }),
                )
                .await
                .unwrap();
        }

        // Act
        let (owned_status, owned) = send(&f.state, post("/2/mint", f.operator, Some(&f.token))).await;
        let (foreign_status, foreign) =
            send(&f.state, post("/3/mint", f.operator, Some(&f.token))).await;

        // Assert
        assert_eq!(owned_status, StatusCode::ACCEPTED);
        assert_eq!(owned["state"], "submitted");
        assert_eq!(foreign_status, StatusCode::BAD_REQUEST);
        assert_eq!(foreign["error"], "NotOwner");
        wait_until("mint submitted", || !f.gateway.submitted_calls().is_empty()).await;
        assert_eq!(f.gateway.submitted_calls()[0].function_name(), "safeMint");
    }
}

//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use adoptchain_auth::application::auth_gate::AuthGate;
use adoptchain_core::pet::Pet;
use adoptchain_core::repository::PetRepository;
use adoptchain_record_store::pg_pet_repository::PgPetRepository;
use adoptchain_test_support::{ManualClock, ScriptedChainGateway, fixed_now};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use alloy_primitives::{Address, hex};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use adoptchain_api::app;
use adoptchain_api::state::AppState;

/// Private key of the wallet the tests sign in with.
pub const WALLET_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Message the test wallet signs.
pub const SIGN_IN_MESSAGE: &str = "Sign in to the shelter";

/// The full app over a real `PgPetRepository`, with a manual clock and a
/// scripted chain.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<ScriptedChainGateway>,
    pub clock: Arc<ManualClock>,
    pub repository: Arc<PgPetRepository>,
}

/// Build the full app router. Uses the same route structure as `main.rs`.
pub fn build_test_app(pool: PgPool) -> TestApp {
    let clock = Arc::new(ManualClock::new(fixed_now()));
    let gateway = Arc::new(ScriptedChainGateway::new());
    let repository = Arc::new(PgPetRepository::new(pool));
    let auth = AuthGate::new(b"integration-secret", clock.clone());
    let state = AppState::new(repository.clone(), clock.clone(), gateway.clone(), auth);

    TestApp {
        router: app(state.clone()),
        state,
        gateway,
        clock,
        repository,
    }
}

impl TestApp {
    /// Insert pets directly into the record store.
    pub async fn seed(&self, pets: impl IntoIterator<Item = Pet>) {
        for pet in pets {
            self.repository.insert(pet).await.unwrap();
        }
    }
}

/// The test wallet.
pub fn wallet() -> PrivateKeySigner {
    WALLET_KEY.parse().unwrap()
}

/// The test wallet's signature over [`SIGN_IN_MESSAGE`], hex encoded.
pub fn wallet_signature() -> String {
    let signature = wallet().sign_message_sync(SIGN_IN_MESSAGE.as_bytes()).unwrap();
    hex::encode_prefixed(signature.as_bytes())
}

/// Sign in through the record API and return the issued credential.
pub async fn sign_in(app: &TestApp) -> (Address, String) {
    let address = wallet().address();
    let body = serde_json::json!({
        "action": "auth",
        "address": address,
        "message": SIGN_IN_MESSAGE,
        "signature": wallet_signature(),
    });
    let (status, json) = post_json(app.router.clone(), "/records", &body, None).await;
    assert_eq!(status, StatusCode::OK);
    (address, json["jsonwebtoken"].as_str().unwrap().to_owned())
}

/// Send a POST request with a JSON body and optional bearer credential and
/// return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
    token: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

//! Integration tests for the record API and application views.

mod common;

use adoptchain_core::pet::PetStatus;
use adoptchain_test_support::{address, fixed_now, pet_fixture};
use axum::http::StatusCode;
use serde_json::json;
use sqlx::PgPool;

fn adopt(address: alloy_primitives::Address, pet_id: i64) -> serde_json::Value {
    json!({ "action": "adopt", "address": address, "petId": pet_id })
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_three_applications_open_settlement_and_keep_first_start_time(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    app.seed([pet_fixture(1)]).await;
    let first_at = fixed_now().timestamp();

    // Act / Assert: eligibility flips exactly on the third application.
    for (i, applicant) in [address(1), address(2), address(3)].into_iter().enumerate() {
        let (status, pet) =
            common::post_json(app.router.clone(), "/records", &adopt(applicant, 1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pet["application_start_time"], first_at);

        let (_, view) = common::get_json(app.router.clone(), "/applications/1").await;
        assert_eq!(view["can_settle"], i == 2, "after application {}", i + 1);
        app.clock.advance_seconds(5);
    }

    let (_, pet) = common::get_json(app.router.clone(), "/records?id=1").await;
    assert_eq!(pet["status"], "pending");
    assert_eq!(
        pet["applicants"],
        json!([address(1), address(2), address(3)])
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_fourth_application_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);
    app.seed([pet_fixture(1)]).await;
    for byte in 1..=3 {
        common::post_json(app.router.clone(), "/records", &adopt(address(byte), 1), None).await;
    }

    let (status, json) =
        common::post_json(app.router.clone(), "/records", &adopt(address(4), 1), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "RosterFull");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_single_applicant_becomes_settleable_after_window(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    app.seed([pet_fixture(1)]).await;
    common::post_json(app.router.clone(), "/records", &adopt(address(1), 1), None).await;

    // Act
    let (_, before) = common::get_json(app.router.clone(), "/applications/1").await;
    app.clock.advance_seconds(101);
    let (_, after) = common::get_json(app.router.clone(), "/applications/1").await;

    // Assert
    assert_eq!(before["can_settle"], false);
    assert_eq!(before["remaining_seconds"], 100);
    assert_eq!(after["can_settle"], true);
    assert_eq!(after["remaining_seconds"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_owner_to_current_owner_is_a_rejected_no_op(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    let mut pet = pet_fixture(1);
    pet.status = PetStatus::Adopted;
    pet.owner = Some(address(7));
    app.seed([pet]).await;
    let (me, token) = common::sign_in(&app).await;
    let body = json!({
        "action": "updateOwner",
        "address": me,
        "petId": 1,
        "newOwner": address(7),
    });

    // Act
    let (status, json) = common::post_json(app.router.clone(), "/records", &body, Some(&token)).await;

    // Assert
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "SameOwner");
    let (_, stored) = common::get_json(app.router.clone(), "/records?id=1").await;
    assert_eq!(stored["owner"], json!(address(7)));
    assert_eq!(stored["status"], "adopted");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_owner_is_refused_while_settlement_runs(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    app.seed([pet_fixture(1)]).await;
    for byte in 1..=3 {
        common::post_json(app.router.clone(), "/records", &adopt(address(byte), 1), None).await;
    }
    let (me, token) = common::sign_in(&app).await;
    let (settle_status, _) = common::post_json(
        app.router.clone(),
        "/settlements/1",
        &json!({ "address": me }),
        Some(&token),
    )
    .await;
    assert_eq!(settle_status, StatusCode::ACCEPTED);
    let body = json!({
        "action": "updateOwner",
        "address": me,
        "petId": 1,
        "newOwner": address(8),
    });

    // Act
    let (status, json) = common::post_json(app.router.clone(), "/records", &body, Some(&token)).await;

    // Assert
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "AlreadyInFlight");
    let (_, stored) = common::get_json(app.router.clone(), "/records?id=1").await;
    assert_eq!(stored["status"], "pending");
    assert_eq!(stored["owner"], serde_json::Value::Null);
    assert_eq!(
        stored["applicants"],
        json!([address(1), address(2), address(3)])
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_update_owner_accepts_legacy_bearer_header(pool: PgPool) {
    // Arrange
    let app = common::build_test_app(pool);
    app.seed([pet_fixture(1)]).await;
    let (me, token) = common::sign_in(&app).await;
    let body = json!({
        "action": "updateOwner",
        "address": me,
        "petId": 1,
        "newOwner": address(8),
    });
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/records")
        .header("content-type", "application/json")
        .header("bearer", format!("Bearer {token}"))
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    // Act
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let (_, stored) = common::get_json(app.router.clone(), "/records?id=1").await;
    assert_eq!(stored["owner"], json!(address(8)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_auth_with_mismatched_signature_issues_nothing(pool: PgPool) {
    let app = common::build_test_app(pool);
    let body = json!({
        "action": "auth",
        "address": address(9),
        "message": common::SIGN_IN_MESSAGE,
        "signature": common::wallet_signature(),
    });

    let (status, json) = common::post_json(app.router.clone(), "/records", &body, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidSignature");
    assert!(json.get("jsonwebtoken").is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_records_list_in_creation_order(pool: PgPool) {
    let app = common::build_test_app(pool);
    let mut later = pet_fixture(1);
    later.created_at += chrono::Duration::minutes(1);
    app.seed([later, pet_fixture(2)]).await;

    let (status, json) = common::get_json(app.router.clone(), "/records").await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = json.as_array().unwrap().iter().map(|p| p["id"].clone()).collect();
    assert_eq!(ids, vec![json!(2), json!(1)]);
}

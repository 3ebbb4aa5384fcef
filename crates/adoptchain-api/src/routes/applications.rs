//! Application views: the pending queue, an applicant's overview, one pet's
//! window, and its live countdown stream.

use std::convert::Infallible;

use adoptchain_admission::application::query_handlers::{
    self, ApplicantOverview, PetApplicationView,
};
use adoptchain_admission::application::scheduler::{Countdown, CountdownEvent};
use adoptchain_core::pet::PetId;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{Json, Router, routing::get};
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::parse_address;
use crate::error::ApiError;
use crate::state::AppState;

/// Query string for GET /applications.
#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub address: String,
}

/// GET /applications/pending
#[instrument(skip(state))]
async fn pending(State(state): State<AppState>) -> Result<Json<Vec<PetApplicationView>>, ApiError> {
    let views =
        query_handlers::list_pending_applications(&*state.repository, state.clock.as_ref()).await?;
    Ok(Json(views))
}

/// GET /applications?address=
#[instrument(skip(state))]
async fn overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<ApplicantOverview>, ApiError> {
    let address = parse_address(&query.address)?;
    let overview = query_handlers::applicant_overview(address, &*state.repository).await?;
    Ok(Json(overview))
}

/// GET /applications/{pet_id}
#[instrument(skip(state))]
async fn application(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
) -> Result<Json<PetApplicationView>, ApiError> {
    let view =
        query_handlers::get_application(pet_id, &*state.repository, state.clock.as_ref()).await?;
    Ok(Json(view))
}

fn sse_event(name: &str, data: &impl serde::Serialize) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|_| Event::default().event(name))
}

fn countdown_events(countdown: Option<Countdown>) -> impl Stream<Item = Event> {
    stream::unfold(countdown, |countdown| async move {
        let mut countdown = countdown?;
        let event = countdown.next().await?;
        let name = match event {
            CountdownEvent::Tick { .. } => "tick",
            CountdownEvent::EligibilityChanged { .. } => "eligibility_changed",
        };
        Some((sse_event(name, &event), Some(countdown)))
    })
}

/// GET /applications/{pet_id}/countdown
///
/// Sends the current window as a `snapshot` event, then one `tick` per
/// second while the window is closing soon. Closing the stream detaches
/// only this observer.
#[instrument(skip(state))]
async fn countdown(
    State(state): State<AppState>,
    Path(pet_id): Path<PetId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let view =
        query_handlers::get_application(pet_id, &*state.repository, state.clock.as_ref()).await?;
    let countdown = state
        .scheduler
        .watch(pet_id, view.pet.application_start_time);
    debug!(pet_id, live = countdown.is_some(), "countdown stream opened");

    let snapshot = sse_event("snapshot", &view);
    let events = stream::once(async move { snapshot })
        .chain(countdown_events(countdown))
        .map(Ok);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Returns the router for application views.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/pending", get(pending))
        .route("/{pet_id}", get(application))
        .route("/{pet_id}/countdown", get(countdown))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use adoptchain_auth::application::auth_gate::AuthGate;
    use adoptchain_core::pet::PetStatus;
    use adoptchain_test_support::{
        FixedClock, InMemoryPetRepository, ScriptedChainGateway, address, fixed_now, pending_pet,
        pet_fixture,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_state_with(repository: InMemoryPetRepository) -> AppState {
        let clock = Arc::new(FixedClock(fixed_now()));
        AppState::new(
            Arc::new(repository),
            clock.clone(),
            Arc::new(ScriptedChainGateway::new()),
            AuthGate::new(b"applications-secret", clock),
        )
    }

    fn started_secs_ago(secs: i64) -> i64 {
        fixed_now().timestamp() - secs
    }

    async fn get_body(state: AppState, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = router().with_state(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body_bytes.to_vec())
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get_body(state, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_pending_lists_window_state() {
        // Arrange
        let state = app_state_with(InMemoryPetRepository::with_pets([
            pet_fixture(1),
            pending_pet(2, vec![address(1)], started_secs_ago(40)),
            pending_pet(3, vec![address(1)], started_secs_ago(500)),
        ]));

        // Act
        let (status, json) = get_json(state, "/pending").await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let views = json.as_array().unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0]["id"], 2);
        assert_eq!(views[0]["remaining_seconds"], 60);
        assert_eq!(views[0]["remaining_display"], "1:00");
        assert_eq!(views[0]["can_settle"], false);
        assert_eq!(views[1]["remaining_seconds"], 0);
        assert_eq!(views[1]["can_settle"], true);
    }

    #[tokio::test]
    async fn test_overview_splits_pending_and_adopted() {
        // Arrange
        let mut adopted = pet_fixture(4);
        adopted.status = PetStatus::Adopted;
        adopted.owner = Some(address(1));
        let state = app_state_with(InMemoryPetRepository::with_pets([
            pending_pet(2, vec![address(1)], started_secs_ago(10)),
            pending_pet(3, vec![address(2)], started_secs_ago(10)),
            adopted,
        ]));

        // Act
        let uri = format!("/?address={}", address(1));
        let (status, json) = get_json(state, &uri).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["pending"].as_array().unwrap().len(), 1);
        assert_eq!(json["pending"][0]["id"], 2);
        assert_eq!(json["adopted"][0]["id"], 4);
    }

    #[tokio::test]
    async fn test_overview_with_malformed_address_returns_400() {
        let state = app_state_with(InMemoryPetRepository::default());

        let (status, json) = get_json(state, "/?address=nobody").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "ValidationError");
    }

    #[tokio::test]
    async fn test_application_view_for_unknown_pet_returns_400() {
        let state = app_state_with(InMemoryPetRepository::default());

        let (status, json) = get_json(state, "/42").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "NotFound");
    }

    #[tokio::test]
    async fn test_countdown_for_closed_window_sends_snapshot_only() {
        let state = app_state_with(InMemoryPetRepository::with_pets([pending_pet(
            2,
            vec![address(1)],
            started_secs_ago(500),
        )]));

        let (status, body) = get_body(state, "/2/countdown").await;

        let text = String::from_utf8(body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("event: snapshot"));
        assert!(!text.contains("event: tick"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_streams_ticks_until_eligible() {
        // Arrange: 98 of 100 seconds elapsed.
        let state = app_state_with(InMemoryPetRepository::with_pets([pending_pet(
            2,
            vec![address(1)],
            started_secs_ago(98),
        )]));

        // Act
        let (status, body) = get_body(state.clone(), "/2/countdown").await;

        // Assert
        let text = String::from_utf8(body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(text.matches("event: tick").count(), 2);
        assert!(text.contains(r#""remaining":0"#));
        assert_eq!(text.matches("event: eligibility_changed").count(), 1);
        assert_eq!(state.scheduler.active(2), 0);
    }
}

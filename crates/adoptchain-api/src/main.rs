//! Adoption settlement API server entry point.

use std::error::Error;
use std::sync::Arc;

use adoptchain_api::config::Config;
use adoptchain_api::state::AppState;
use adoptchain_api::{app, telemetry};
use adoptchain_auth::application::auth_gate::AuthGate;
use adoptchain_chain::RpcChainGateway;
use adoptchain_core::clock::{Clock, SystemClock};
use adoptchain_record_store::pg_pet_repository::PgPetRepository;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!(?config, "Starting adoption settlement API server");

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let repository = PgPetRepository::new(pool);
    repository.ensure_schema().await?;

    let gateway = RpcChainGateway::connect(
        &config.chain_ws_url,
        config.contract_address,
        &config.signer_private_key,
    )
    .await?;

    // Build application state.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let auth = AuthGate::new(config.jwt_secret.as_bytes(), Arc::clone(&clock))
        .with_operators(config.operators.clone());
    let app_state = AppState::new(Arc::new(repository), clock, Arc::new(gateway), auth);

    // TODO: Replace CorsLayer::permissive() with the wallet front-end origin once it is fixed.
    let router = app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_address()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    telemetry.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

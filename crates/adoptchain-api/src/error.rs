//! API error types.

use adoptchain_core::error::{
    AdmissionError, AuthError, ChainError, DomainError, PersistenceError, SettlementError,
};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record store could not be prepared.
    #[error("record store error: {0}")]
    Store(#[from] DomainError),

    /// The chain node could not be reached.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// The tracing pipeline could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl<E: Into<DomainError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn classify(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::Admission(err) => (
            StatusCode::BAD_REQUEST,
            match err {
                AdmissionError::DuplicateApplicant(_) => "DuplicateApplicant",
                AdmissionError::RosterFull(_) => "RosterFull",
                AdmissionError::AlreadyAdopted(_) => "AlreadyAdopted",
            },
        ),
        DomainError::Auth(err) => match err {
            AuthError::InvalidSignature => (StatusCode::BAD_REQUEST, "InvalidSignature"),
            AuthError::NotOperator(_) => (StatusCode::FORBIDDEN, "NotOperator"),
            AuthError::MissingCredential => (StatusCode::UNAUTHORIZED, "MissingCredential"),
            AuthError::InvalidCredential => (StatusCode::UNAUTHORIZED, "InvalidCredential"),
            AuthError::ExpiredCredential => (StatusCode::UNAUTHORIZED, "ExpiredCredential"),
            AuthError::AddressMismatch => (StatusCode::UNAUTHORIZED, "AddressMismatch"),
        },
        DomainError::Chain(err) => (
            StatusCode::BAD_GATEWAY,
            match err {
                ChainError::SimulationFailed(_) => "SimulationFailed",
                ChainError::TransactionReverted(_) => "TransactionReverted",
                ChainError::ConfirmationTimeout(_) => "ConfirmationTimeout",
                ChainError::Transport(_) => "ChainUnavailable",
            },
        ),
        DomainError::Persistence(err) => match err {
            PersistenceError::NotFound(_) => (StatusCode::BAD_REQUEST, "NotFound"),
            PersistenceError::WriteConflict(_) => (StatusCode::BAD_REQUEST, "WriteConflict"),
            PersistenceError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StoreUnavailable"),
        },
        DomainError::Settlement(err) => match err {
            SettlementError::AlreadyInFlight(_) => (StatusCode::CONFLICT, "AlreadyInFlight"),
            SettlementError::NotEligible(_) => (StatusCode::BAD_REQUEST, "NotEligible"),
            SettlementError::NotOwner { .. } => (StatusCode::BAD_REQUEST, "NotOwner"),
            SettlementError::AlreadyMinted(_) => (StatusCode::BAD_REQUEST, "AlreadyMinted"),
            SettlementError::NotFound(_) => (StatusCode::BAD_REQUEST, "SettlementNotFound"),
            SettlementError::RecordChanged(_) => (StatusCode::CONFLICT, "RecordChanged"),
        },
        DomainError::SameOwner(_) => (StatusCode::BAD_REQUEST, "SameOwner"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = classify(&self.0);

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

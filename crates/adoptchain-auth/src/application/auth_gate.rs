//! The auth gate: issues session credentials for signed messages and
//! authorizes credentials against a claimed address.

use std::fmt;
use std::sync::Arc;

use adoptchain_core::clock::Clock;
use adoptchain_core::error::AuthError;
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, warn};

use crate::domain::credential::{Claims, SESSION_VALIDITY_SECS, SessionCredential};
use crate::domain::signature::verify_signed_message;

/// Strips the `Bearer ` scheme from an authorization header value.
#[must_use]
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Stateless session issuer and validator.
pub struct AuthGate {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
    operators: Vec<Address>,
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("operators", &self.operators)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    /// Create a gate that signs credentials with the HMAC `secret`.
    #[must_use]
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            clock,
            operators: Vec::new(),
        }
    }

    /// Restrict operator actions to `operators`. An empty list admits every
    /// authenticated address.
    #[must_use]
    pub fn with_operators(mut self, operators: Vec<Address>) -> Self {
        self.operators = operators;
        self
    }

    /// Verify that `address` signed `message` and issue a credential valid
    /// for one hour.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSignature` if the recovered signer is not
    /// `address`.
    pub fn issue_session(
        &self,
        address: Address,
        message: &str,
        signature: &str,
    ) -> Result<SessionCredential, AuthError> {
        if let Err(err) = verify_signed_message(address, message, signature) {
            warn!(%address, "rejected session request with a bad signature");
            return Err(err);
        }

        let iat = self.clock.unix_seconds();
        let claims = Claims {
            address,
            iat,
            exp: iat + SESSION_VALIDITY_SECS,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            // HS256 encoding only fails on malformed keys, which `from_secret` never builds.
            .map_err(|_| AuthError::InvalidCredential)?;

        debug!(%address, "issued session credential");
        Ok(SessionCredential {
            token,
            address,
            expires_at: DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_default(),
        })
    }

    /// Check that `credential` is a live session issued to `claimed`.
    /// Addresses compare case-insensitively because they are compared as
    /// bytes.
    ///
    /// # Errors
    ///
    /// - `MissingCredential` if `credential` is `None`.
    /// - `InvalidCredential` if the token does not decode under our key.
    /// - `ExpiredCredential` if the validity window has passed.
    /// - `AddressMismatch` if the token belongs to another address.
    pub fn authorize(
        &self,
        credential: Option<&str>,
        claimed: Address,
    ) -> Result<Address, AuthError> {
        let token = credential.ok_or(AuthError::MissingCredential)?;

        // Expiry is checked against the injected clock, not the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidCredential)?
            .claims;

        if self.clock.unix_seconds() >= claims.exp {
            return Err(AuthError::ExpiredCredential);
        }
        if claims.address != claimed {
            return Err(AuthError::AddressMismatch);
        }
        Ok(claims.address)
    }

    /// [`authorize`](Self::authorize), then check the operator allow-list.
    ///
    /// # Errors
    ///
    /// Any error of `authorize`, or `NotOperator` if the address is not on
    /// a non-empty allow-list.
    pub fn authorize_operator(
        &self,
        credential: Option<&str>,
        claimed: Address,
    ) -> Result<Address, AuthError> {
        let address = self.authorize(credential, claimed)?;
        if !self.operators.is_empty() && !self.operators.contains(&address) {
            warn!(%address, "operator action refused");
            return Err(AuthError::NotOperator(address));
        }
        Ok(address)
    }
}

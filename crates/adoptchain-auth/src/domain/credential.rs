//! Session credential types.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long an issued credential stays valid, in seconds.
pub const SESSION_VALIDITY_SECS: i64 = 60 * 60;

/// JWT claims carried by a session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The wallet address the credential was issued to.
    pub address: Address,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// A freshly issued session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCredential {
    /// The encoded token, sent back as `Bearer <token>`.
    pub token: String,
    /// The address bound into the token.
    pub address: Address,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

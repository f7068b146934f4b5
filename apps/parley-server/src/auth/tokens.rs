//! Session token (JWT, HS256) minting and verification.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Claims embedded in a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the user's prefixed ULID.
    pub sub: String,
    /// Username bound at registration time.
    pub username: String,
    /// Issued-at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

/// A verified identity extracted from a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Why a credential was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No credential supplied.
    Missing,
    /// Malformed token or bad signature.
    Invalid,
    /// Well-formed and correctly signed, but past `exp`.
    Expired,
}

impl AuthError {
    /// The message sent to clients. Deliberately does not leak signature
    /// or claim details.
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::Missing => "No token provided",
            AuthError::Invalid => "Invalid token",
            AuthError::Expired => "Token expired",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthError {}

/// Mint a signed session token for a verified user.
pub fn issue_token(
    user_id: &str,
    username: &str,
    secret: &str,
    ttl: Duration,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key).map_err(|e| {
        tracing::error!(?e, "failed to sign session token");
        ApiError::internal("Token signing failed")
    })
}

/// Verify a session token and extract the identity it carries.
///
/// An empty or whitespace-only token counts as a missing credential, not
/// an invalid one.
pub fn verify_token(token: &str, secret: &str) -> Result<Identity, AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::Missing);
    }

    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is a hard edge; tokens on the boundary are rejected.
    validation.leeway = 0;

    let token_data = jsonwebtoken::decode::<Claims>(token, &key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid,
        }
    })?;

    Ok(Identity {
        user_id: token_data.claims.sub,
        username: token_data.claims.username,
    })
}

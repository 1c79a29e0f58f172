//! Session-token authentication.
//!
//! Signup/login issue an opaque bearer token (uuid v4) stored in the
//! sessions table; the `AuthUser` extractor resolves it back to a user id.
//! Google-auth accounts carry a sentinel in place of a credential hash and
//! can never log in with a password.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::{ApiError, SharedState};

/// Credential sentinel for accounts created through Google auth.
pub const GOOGLE_AUTH_SENTINEL: &str = "google-auth-user";

pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn generate_session_token() -> String {
    Uuid::new_v4().to_string()
}

/// Salted SHA-256 digest, hex encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    if expected_hash == GOOGLE_AUTH_SENTINEL {
        return false;
    }
    hash_password(password, salt) == expected_hash
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Invalid token format".to_string()))?
            .trim()
            .to_string();

        let user_id = state
            .db
            .call(move |db| db.find_session_user(&token))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?
            .ok_or_else(|| ApiError::Unauthorized("Token is not valid".to_string()))?;
        Ok(AuthUser(user_id))
    }
}

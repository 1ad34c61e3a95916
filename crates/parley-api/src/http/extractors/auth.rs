//! API key authentication extractor.
//!
//! Reads the `X-API-KEY` header and compares its SHA-256 digest with the
//! digest of the configured key, so the plaintext key is never held in
//! request-handling state.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::http::error::AppError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated request marker. Extracting this validates the API key.
pub struct Authenticated;

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthorized)?;

        if hash_api_key(provided) == *state.api_key_hash {
            Ok(Authenticated)
        } else {
            tracing::debug!("Rejected request with an invalid API key");
            Err(AppError::Unauthorized)
        }
    }
}

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

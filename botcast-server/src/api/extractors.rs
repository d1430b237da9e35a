//! Custom Axum extractors for request authentication.
//!
//! `AdminAuth` checks the `Botcast-Admin-Authorization` header, which carries
//! the plaintext admin secret, against the argon2 hash from the config.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use botcast_sdk::headers::ADMIN_AUTH_HEADER;

use crate::state::AppState;

/// Proof that the request carried the admin secret.
pub struct AdminAuth;

#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing Botcast-Admin-Authorization header")]
    MissingHeader,
    #[error("invalid Botcast-Admin-Authorization header")]
    InvalidHeader,
    #[error("admin secret mismatch")]
    Mismatch,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminAuthError::MissingHeader | AdminAuthError::Mismatch => StatusCode::UNAUTHORIZED,
            AdminAuthError::InvalidHeader => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?;

        let admin = state.admin.read().await;
        if !admin.verify_secret(secret) {
            drop(admin);
            tracing::warn!("Rejected admin request with a wrong secret");
            return Err(AdminAuthError::Mismatch);
        }
        drop(admin);
        Ok(AdminAuth)
    }
}

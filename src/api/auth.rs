use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::types::ErrorDetail;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Bearer token")]
    MissingHeader,

    #[error("Authorization header must use the Bearer scheme")]
    MalformedHeader,

    #[error("Invalid Bearer token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(ErrorDetail {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Decides whether a bearer token is acceptable.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Accepts any token; only the header's presence and scheme are checked.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAnyToken;

impl TokenVerifier for AcceptAnyToken {
    fn verify(&self, _token: &str) -> bool {
        true
    }
}

/// Accepts exactly one configured token.
#[derive(Debug, Clone)]
pub struct StaticToken {
    expected: String,
}

impl StaticToken {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl TokenVerifier for StaticToken {
    fn verify(&self, token: &str) -> bool {
        !token.is_empty() && token == self.expected
    }
}

const BEARER_PREFIX: &str = "bearer ";

/// Checks the `Authorization` header: present, `Bearer ` scheme (any case), token accepted.
pub fn authorize(headers: &HeaderMap, verifier: &dyn TokenVerifier) -> Result<(), AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    let scheme = value.get(..BEARER_PREFIX.len()).ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(AuthError::MalformedHeader);
    }

    let token = value[BEARER_PREFIX.len()..].trim();
    if verifier.verify(token) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

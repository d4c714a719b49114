//! Caller identity for try-on requests.
//!
//! Session tokens come from an external identity provider and arrive as
//! HS256-signed JWT bearer tokens. Requests without a token are treated as the
//! shared guest principal unless `REQUIRE_AUTH` is set.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::AppError;

/// Owner id recorded for unauthenticated requests.
pub const GUEST_PRINCIPAL: &str = "guest";

/// Claims we rely on. Other claims in the token are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity provider's user id
    pub sub: String,
    pub exp: usize,
}

#[derive(Clone)]
pub struct AuthSettings {
    decoding_key: Option<DecodingKey>,
    require_auth: bool,
}

impl AuthSettings {
    pub fn new(secret: Option<&str>, require_auth: bool) -> Self {
        Self {
            decoding_key: secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            require_auth,
        }
    }

    pub fn require_auth(&self) -> bool {
        self.require_auth
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let key = self.decoding_key.as_ref().ok_or_else(|| {
            AppError::Unauthorized("Token verification is not configured".into())
        })?;

        decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                AppError::Unauthorized("Invalid or expired session".into())
            })
    }

    /// Resolve the principal from an optional `Authorization` header value.
    pub fn principal_from_header(&self, header: Option<&str>) -> Result<Principal, AppError> {
        match header {
            Some(value) => {
                let token = value.strip_prefix("Bearer ").ok_or_else(|| {
                    AppError::Unauthorized(
                        "Invalid Authorization format. Expected: Bearer <token>".into(),
                    )
                })?;
                let claims = self.verify(token.trim())?;
                Ok(Principal {
                    id: claims.sub,
                    is_guest: false,
                })
            }
            None if self.require_auth => Err(AppError::Unauthorized(
                "Missing Authorization header".into(),
            )),
            None => Ok(Principal::guest()),
        }
    }
}

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub is_guest: bool,
}

impl Principal {
    pub fn guest() -> Self {
        Self {
            id: GUEST_PRINCIPAL.to_string(),
            is_guest: true,
        }
    }
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .map(|v| {
                v.to_str()
                    .map_err(|_| AppError::Unauthorized("Malformed Authorization header".into()))
            })
            .transpose()?;

        state.auth.principal_from_header(header)
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated senders.
//!
//! Use the `Auth` extractor in handlers to require a session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, Validation};

use super::{AuthError, AuthenticatedUser, SessionClaims};
use crate::state::{AppState, AuthConfig};

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for authenticated senders.
///
/// Validates the bearer session token from the Authorization header.
///
/// # Example
///
/// ```rust,ignore
/// async fn list_shares(
///     Auth(user): Auth,
///     State(state): State<AppState>,
/// ) -> Result<Json<ShareListResponse>, ApiError> {
///     // user.user_id is the sender
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_session(token, &state.auth)?;
        Ok(Auth(user))
    }
}

/// Verify a session JWT and extract the sender.
pub fn verify_session(token: &str, config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    validation.validate_aud = false;
    validation.validate_nbf = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let token_data = decode::<SessionClaims>(token, config.decoding_key(), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        })?;

    if token_data.claims.sub.trim().is_empty() {
        return Err(AuthError::MalformedToken);
    }

    Ok(AuthenticatedUser::from_claims(token_data.claims))
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    use super::*;

    /// Mint an HS256 session token for `sub`, expiring `exp_offset` seconds
    /// from now.
    pub fn session_token(secret: &[u8], sub: &str, email: Option<&str>, exp_offset: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: sub.to_string(),
            email: email.map(str::to_string),
            iat: now,
            exp: now + exp_offset,
            nbf: None,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::session_token;
    use super::*;
    use crate::state::testing::{test_state, AUTH_SECRET};
    use axum::http::Request;

    fn parts_with(header: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/test");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _temp) = test_state();
        let mut parts = parts_with(None);
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_rejects_non_bearer_scheme() {
        let (state, _temp) = test_state();
        let mut parts = parts_with(Some("Basic dXNlcjpwYXNz".to_string()));
        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InvalidAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_session() {
        let (state, _temp) = test_state();
        let token = session_token(AUTH_SECRET, "user_123", Some("alice@example.com"), 600);
        let mut parts = parts_with(Some(format!("Bearer {token}")));

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn expired_session_is_rejected() {
        let config = AuthConfig::new(AUTH_SECRET);
        let token = session_token(AUTH_SECRET, "user_123", None, -(CLOCK_SKEW_LEEWAY as i64) - 60);
        assert_eq!(verify_session(&token, &config).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn session_within_leeway_is_accepted() {
        let config = AuthConfig::new(AUTH_SECRET);
        let token = session_token(AUTH_SECRET, "user_123", None, -10);
        assert!(verify_session(&token, &config).is_ok());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = AuthConfig::new(AUTH_SECRET);
        let token = session_token(b"some-other-secret-some-other-secret", "user_123", None, 600);
        assert_eq!(verify_session(&token, &config).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let config = AuthConfig::new(AUTH_SECRET);
        assert_eq!(verify_session("abc.def", &config).unwrap_err(), AuthError::MalformedToken);
    }
}

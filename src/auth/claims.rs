// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session JWT claims and the authenticated sender.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Claims carried by a sender session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (sender id)
    pub sub: String,

    /// Sender email, used as the share's reply-to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Not before timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
}

/// Authenticated sender extracted from a session token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical sender id (`sub` claim)
    pub user_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Token expiration (Unix timestamp)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: SessionClaims) -> Self {
        let email = claims.email.filter(|e| !e.trim().is_empty());
        Self {
            user_id: claims.sub,
            email,
            expires_at: claims.exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> SessionClaims {
        SessionClaims {
            sub: "user_123".to_string(),
            email: Some("alice@example.com".to_string()),
            iat: 1700000000,
            exp: 1700003600,
            nbf: None,
        }
    }

    #[test]
    fn from_claims_extracts_user_id_and_email() {
        let user = AuthenticatedUser::from_claims(sample_claims());
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
        assert_eq!(user.expires_at, 1700003600);
    }

    #[test]
    fn blank_email_is_dropped() {
        let mut claims = sample_claims();
        claims.email = Some("  ".to_string());
        assert!(AuthenticatedUser::from_claims(claims).email.is_none());
    }

    #[test]
    fn email_claim_is_optional() {
        let claims: SessionClaims =
            serde_json::from_str(r#"{"sub":"user_9","exp":1700003600}"#).unwrap();
        assert!(claims.email.is_none());
        assert_eq!(claims.iat, 0);
    }
}

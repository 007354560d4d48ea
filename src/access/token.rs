// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed access capabilities (HS256 JWT).

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::Envelope;
use crate::keyring::KeyVersion;
use crate::shares::Share;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("access token has expired")]
    Expired,

    #[error("access token signature is invalid")]
    BadSignature,

    #[error("access token is malformed")]
    Malformed,

    #[error("failed to sign access token: {0}")]
    Signing(String),
}

/// Claims carried by an access token.
///
/// Everything needed to locate and decrypt the file travels in the token;
/// the wrapped key is only useful to the holder of the private key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityClaims {
    pub storage_token: String,
    pub blob_key: String,
    pub file_name: String,
    /// Base64 RSA-OAEP wrapped file key.
    pub wrapped_key: String,
    /// Base64 CBC IV.
    pub iv: String,
    pub key_version: KeyVersion,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl CapabilityClaims {
    pub fn for_share(share: &Share, envelope: &Envelope, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let iat = issued_at.timestamp();
        Self {
            storage_token: share.storage_token.clone(),
            blob_key: share.blob_key.clone(),
            file_name: share.file_name.clone(),
            wrapped_key: envelope.wrapped_key_base64(),
            iv: envelope.iv.to_base64(),
            key_version: envelope.key_version,
            iat,
            exp: iat.saturating_add(ttl_secs),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Signs and verifies access tokens with a server secret.
pub struct CapabilitySigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl CapabilitySigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn sign(&self, claims: &CapabilityClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify signature and expiry (no leeway).
    pub fn verify(&self, token: &str) -> Result<CapabilityClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        decode::<CapabilityClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })
    }

    /// Decode claims without checking signature or expiry.
    ///
    /// Only for reporting share state to a stale or forged token; never
    /// grants access.
    pub fn inspect(&self, token: &str) -> Result<CapabilityClaims, TokenError> {
        jsonwebtoken::dangerous::insecure_decode::<CapabilityClaims>(token)
            .map(|data| data.claims)
            .map_err(|_| TokenError::Malformed)
    }

    /// The share a token claims to name, if it decodes at all. For audit
    /// attribution only.
    pub fn peek_storage_token(token: &str) -> Option<String> {
        jsonwebtoken::dangerous::insecure_decode::<CapabilityClaims>(token)
            .ok()
            .map(|data| data.claims.storage_token)
    }
}

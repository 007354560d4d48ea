// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Issuing and validating access.
//!
//! ## Validation order
//!
//! 1. Verify the token (signature + expiry). If that fails, decode it
//!    without verification so a stale link still gets a precise answer.
//! 2. Report share state: downloaded, revoked, expired, or unknown.
//! 3. Only for a Pending share with a verified token: check the OTP. A
//!    correct code is consumed atomically.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::otp::{OtpCheck, OtpStore};
use super::token::{CapabilityClaims, CapabilitySigner, TokenError};
use crate::crypto::Envelope;
use crate::shares::{LifecycleError, Share, ShareLifecycle, ShareStatus};
use crate::storage::StorageError;

/// Why a redeem attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Unparseable, forged, or expired token for a share that is still pending.
    TokenInvalid,
    AlreadyDownloaded,
    Revoked,
    Expired,
    /// Verified token naming a share that no longer exists.
    NotAvailable,
    /// No OTP record for this token.
    OtpInvalid,
    OtpExpired,
    OtpMismatch,
}

impl DenialReason {
    /// Map a terminal share status to its denial.
    pub fn for_status(status: ShareStatus) -> Option<Self> {
        match status {
            ShareStatus::Pending => None,
            ShareStatus::Downloaded => Some(Self::AlreadyDownloaded),
            ShareStatus::Revoked => Some(Self::Revoked),
            ShareStatus::Expired => Some(Self::Expired),
        }
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::AlreadyDownloaded => "ALREADY_DOWNLOADED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::NotAvailable => "NOT_AVAILABLE",
            Self::OtpInvalid => "OTP_INVALID",
            Self::OtpExpired => "OTP_EXPIRED",
            Self::OtpMismatch => "OTP_MISMATCH",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::TokenInvalid => "Invalid or expired download link",
            Self::AlreadyDownloaded => "This file has already been downloaded",
            Self::Revoked => "The sender has revoked access to this file",
            Self::Expired => "This download link has expired",
            Self::NotAvailable => "File not available",
            Self::OtpInvalid => "Invalid or expired one-time code",
            Self::OtpExpired => "The one-time code has expired",
            Self::OtpMismatch => "Incorrect one-time code",
        }
    }

    pub fn is_otp_failure(self) -> bool {
        matches!(self, Self::OtpInvalid | Self::OtpExpired | Self::OtpMismatch)
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("access denied: {0}")]
    Denied(DenialReason),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to issue access token: {0}")]
    Issue(#[from] TokenError),
}

impl From<LifecycleError> for AccessError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Storage(e) => AccessError::Storage(e),
            LifecycleError::NotFound
            | LifecycleError::InvalidState(_)
            | LifecycleError::NotOwner => AccessError::Denied(DenialReason::NotAvailable),
        }
    }
}

/// Output of [`AccessProtocol::issue`]. The two secrets must travel over
/// different channels.
#[derive(Clone)]
pub struct IssuedAccess {
    pub token: String,
    pub otp: String,
    pub expires_at: chrono::DateTime<Utc>,
}

impl std::fmt::Debug for IssuedAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedAccess")
            .field("token", &"<redacted>")
            .field("otp", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A redeem attempt that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedAccess {
    pub claims: CapabilityClaims,
    pub share: Share,
}

pub struct AccessProtocol {
    signer: CapabilitySigner,
    otps: OtpStore,
    lifecycle: Arc<ShareLifecycle>,
}

impl AccessProtocol {
    pub fn new(signer: CapabilitySigner, otps: OtpStore, lifecycle: Arc<ShareLifecycle>) -> Self {
        Self {
            signer,
            otps,
            lifecycle,
        }
    }

    /// Sign a capability for `share` and register a fresh OTP for it.
    pub fn issue(&self, share: &Share, envelope: &Envelope) -> Result<IssuedAccess, AccessError> {
        let claims = CapabilityClaims::for_share(share, envelope, Utc::now(), self.signer.ttl());
        let token = self.signer.sign(&claims)?;
        let otp = OtpStore::generate();
        self.otps.insert(&token, &otp);

        debug!(storage_token = %share.storage_token, jti = %claims.jti, "Access issued");
        Ok(IssuedAccess {
            token,
            otp,
            expires_at: claims.expires_at(),
        })
    }

    /// Decide whether `(token, otp)` may redeem its share right now.
    pub fn validate(&self, token: &str, otp: &str) -> Result<ValidatedAccess, AccessError> {
        let (claims, verified) = match self.signer.verify(token) {
            Ok(claims) => (claims, true),
            Err(verify_err) => match self.signer.inspect(token) {
                Ok(claims) => {
                    debug!(error = %verify_err, "Unverified token; reporting share state only");
                    (claims, false)
                }
                Err(_) => return Err(AccessError::Denied(DenialReason::TokenInvalid)),
            },
        };

        let Some(share) = self.lifecycle.get(&claims.storage_token)? else {
            let reason = if verified {
                DenialReason::NotAvailable
            } else {
                DenialReason::TokenInvalid
            };
            return Err(AccessError::Denied(reason));
        };

        if let Some(reason) = DenialReason::for_status(share.status) {
            return Err(AccessError::Denied(reason));
        }
        if !verified || claims.blob_key != share.blob_key || claims.key_version != share.key_version {
            return Err(AccessError::Denied(DenialReason::TokenInvalid));
        }

        match self.otps.check_and_consume(token, otp) {
            OtpCheck::Valid => Ok(ValidatedAccess { claims, share }),
            OtpCheck::Missing => Err(AccessError::Denied(DenialReason::OtpInvalid)),
            OtpCheck::Expired => Err(AccessError::Denied(DenialReason::OtpExpired)),
            OtpCheck::Mismatch => Err(AccessError::Denied(DenialReason::OtpMismatch)),
        }
    }

    pub fn purge_expired_otps(&self) -> usize {
        self.otps.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_iv;
    use crate::keyring::KeyVersion;
    use crate::shares::{NewShare, Recipient};
    use crate::storage::MemoryShareStore;
    use std::time::Duration;

    const SECRET: &[u8] = b"access-secret-access-secret-0123";

    struct Fixture {
        protocol: AccessProtocol,
        lifecycle: Arc<ShareLifecycle>,
        store: Arc<MemoryShareStore>,
    }

    fn fixture_with(share_ttl: Duration, token_ttl: Duration, otp_ttl: Duration) -> Fixture {
        let store = Arc::new(MemoryShareStore::new());
        let (lifecycle, _rx) = ShareLifecycle::new(store.clone(), share_ttl);
        let protocol = AccessProtocol::new(
            CapabilitySigner::new(SECRET, token_ttl),
            OtpStore::new(SECRET, 100, otp_ttl),
            Arc::clone(&lifecycle),
        );
        Fixture {
            protocol,
            lifecycle,
            store,
        }
    }

    fn fixture() -> Fixture {
        let ttl = Duration::from_secs(300);
        fixture_with(ttl, ttl, ttl)
    }

    fn create_and_issue(fx: &Fixture) -> (Share, IssuedAccess) {
        let share = fx
            .lifecycle
            .create(NewShare {
                blob_key: "blob-1.enc".to_string(),
                file_name: "report.pdf".to_string(),
                size_bytes: 11,
                sender_id: "alice".to_string(),
                sender_email: None,
                recipient: Recipient {
                    email: "bob@example.com".to_string(),
                    phone: "+15550100".to_string(),
                },
                key_version: KeyVersion::new(1),
            })
            .unwrap();
        let envelope = Envelope {
            ciphertext: Vec::new(),
            iv: generate_iv(),
            wrapped_key: vec![7; 16],
            key_version: KeyVersion::new(1),
        };
        let issued = fx.protocol.issue(&share, &envelope).unwrap();
        (share, issued)
    }

    fn denial(result: Result<ValidatedAccess, AccessError>) -> DenialReason {
        match result {
            Err(AccessError::Denied(reason)) => reason,
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn issued_otp_is_six_digits() {
        let fx = fixture();
        let (_share, issued) = create_and_issue(&fx);
        assert_eq!(issued.otp.len(), 6);
        assert!(issued.otp.chars().all(|c| c.is_ascii_digit()));
        assert!(!format!("{issued:?}").contains(&issued.otp));
    }

    #[test]
    fn valid_pair_passes_and_otp_is_one_shot() {
        let fx = fixture();
        let (share, issued) = create_and_issue(&fx);

        let access = fx.protocol.validate(&issued.token, &issued.otp).unwrap();
        assert_eq!(access.share.storage_token, share.storage_token);
        assert_eq!(access.claims.blob_key, "blob-1.enc");

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, &issued.otp)),
            DenialReason::OtpInvalid
        );
    }

    #[test]
    fn wrong_code_does_not_consume() {
        let fx = fixture();
        let (_share, issued) = create_and_issue(&fx);
        let wrong = if issued.otp == "123456" { "654321" } else { "123456" };

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, wrong)),
            DenialReason::OtpMismatch
        );
        assert!(fx.protocol.validate(&issued.token, &issued.otp).is_ok());
    }

    #[test]
    fn state_is_reported_before_otp() {
        let fx = fixture();
        let (share, issued) = create_and_issue(&fx);
        fx.lifecycle.transition_to_revoked(&share.storage_token, "alice").unwrap();

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, "000000")),
            DenialReason::Revoked
        );
    }

    #[test]
    fn downloaded_share_reports_already_downloaded() {
        let fx = fixture();
        let (share, issued) = create_and_issue(&fx);
        fx.lifecycle.transition_to_downloaded(&share.storage_token).unwrap();

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, &issued.otp)),
            DenialReason::AlreadyDownloaded
        );
    }

    #[test]
    fn overdue_share_reports_expired_even_with_expired_token() {
        let fx = fixture_with(Duration::ZERO, Duration::ZERO, Duration::from_secs(300));
        let (_share, issued) = create_and_issue(&fx);
        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, &issued.otp)),
            DenialReason::Expired
        );
    }

    #[test]
    fn expired_otp_is_reported() {
        let fx = fixture_with(
            Duration::from_secs(300),
            Duration::from_secs(300),
            Duration::from_millis(1),
        );
        let (_share, issued) = create_and_issue(&fx);
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, &issued.otp)),
            DenialReason::OtpExpired
        );
    }

    #[test]
    fn garbage_token_is_invalid() {
        let fx = fixture();
        assert_eq!(
            denial(fx.protocol.validate("garbage", "123456")),
            DenialReason::TokenInvalid
        );
    }

    #[test]
    fn forged_token_for_pending_share_is_invalid() {
        let fx = fixture();
        let (share, issued) = create_and_issue(&fx);
        let forger = CapabilitySigner::new(b"forged-secret-forged-secret-0123", Duration::from_secs(300));
        let claims = forger.inspect(&issued.token).unwrap();
        let forged = forger.sign(&claims).unwrap();

        assert_eq!(
            denial(fx.protocol.validate(&forged, &issued.otp)),
            DenialReason::TokenInvalid
        );
        assert_eq!(
            fx.lifecycle.get_status(&share.storage_token).unwrap(),
            ShareStatus::Pending
        );
    }

    #[test]
    fn verified_token_for_missing_share_is_not_available() {
        let fx = fixture();
        let (share, _issued) = create_and_issue(&fx);
        let envelope = Envelope {
            ciphertext: Vec::new(),
            iv: generate_iv(),
            wrapped_key: vec![7; 16],
            key_version: KeyVersion::new(1),
        };
        let mut ghost = share.clone();
        ghost.storage_token = "no-such-share".to_string();
        let issued = fx.protocol.issue(&ghost, &envelope).unwrap();

        assert_eq!(
            denial(fx.protocol.validate(&issued.token, &issued.otp)),
            DenialReason::NotAvailable
        );
    }

    #[test]
    fn store_outage_is_not_a_denial() {
        let fx = fixture();
        let (_share, issued) = create_and_issue(&fx);
        fx.store.set_unavailable(true);

        assert!(matches!(
            fx.protocol.validate(&issued.token, &issued.otp),
            Err(AccessError::Storage(_))
        ));
        fx.store.set_unavailable(false);
        assert!(fx.protocol.validate(&issued.token, &issued.otp).is_ok());
    }

    #[test]
    fn denial_codes_are_stable() {
        assert_eq!(DenialReason::AlreadyDownloaded.code(), "ALREADY_DOWNLOADED");
        assert_eq!(DenialReason::OtpMismatch.code(), "OTP_MISMATCH");
        assert!(DenialReason::OtpExpired.is_otp_failure());
        assert!(!DenialReason::Revoked.is_otp_failure());
        assert_eq!(DenialReason::for_status(ShareStatus::Pending), None);
    }
}

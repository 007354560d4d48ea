// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Every type derives
//! `ToSchema` for the OpenAPI document.
//!
//! Secrets never appear in these types: the access token and one-time code
//! reach the recipient only through the delivery channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::shares::{Share, ShareStatus};
use crate::transfer::UploadReceipt;

// =============================================================================
// Shares
// =============================================================================

/// A share as shown to its sender.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ShareView {
    pub storage_token: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub recipient_email: String,
    /// Phone number with all but the last two digits masked.
    pub recipient_phone: String,
    pub status: ShareStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl From<&Share> for ShareView {
    fn from(share: &Share) -> Self {
        Self {
            storage_token: share.storage_token.clone(),
            file_name: share.file_name.clone(),
            size_bytes: share.size_bytes,
            recipient_email: share.recipient.email.clone(),
            recipient_phone: mask_phone(&share.recipient.phone),
            status: share.status,
            created_at: share.created_at,
            expires_at: share.expires_at,
            downloaded_at: share.downloaded_at,
            revoked_at: share.revoked_at,
            expired_at: share.expired_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShareListResponse {
    pub shares: Vec<ShareView>,
}

// =============================================================================
// Uploads
// =============================================================================

/// Returned after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub share: ShareView,
    /// Whether the access link reached the primary channel.
    pub primary_delivered: bool,
    /// Whether the one-time code reached the secondary channel.
    pub secondary_delivered: bool,
}

impl From<&UploadReceipt> for UploadResponse {
    fn from(receipt: &UploadReceipt) -> Self {
        Self {
            share: ShareView::from(&receipt.share),
            primary_delivered: receipt.primary_delivered,
            secondary_delivered: receipt.secondary_delivered,
        }
    }
}

// =============================================================================
// Downloads
// =============================================================================

/// Credentials presented by a recipient.
#[derive(Clone, Deserialize, ToSchema)]
pub struct DownloadRequest {
    /// Access token from the primary channel.
    pub token: String,
    /// Six-digit code from the secondary channel.
    pub otp: String,
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("token", &"<redacted>")
            .field("otp", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Revocation
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    pub share: ShareView,
}

fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let keep = chars.len().min(2);
    let masked = chars.len() - keep;
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < masked && c.is_ascii_digit() { '*' } else { *c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shares::testing::sample_share;

    #[test]
    fn share_view_masks_phone() {
        let share = sample_share("tok-1", "alice", 1);
        let view = ShareView::from(&share);
        assert_eq!(view.storage_token, "tok-1");
        assert_eq!(view.recipient_phone, "+******00");
    }

    #[test]
    fn mask_phone_keeps_formatting() {
        assert_eq!(mask_phone("+1 555 0100"), "+* *** **00");
        assert_eq!(mask_phone("7"), "7");
        assert_eq!(mask_phone(""), "");
    }

    #[test]
    fn terminal_timestamps_are_omitted_while_pending() {
        let share = sample_share("tok-1", "alice", 1);
        let json = serde_json::to_value(ShareView::from(&share)).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("downloaded_at").is_none());
    }

    #[test]
    fn download_request_debug_is_redacted() {
        let req = DownloadRequest {
            token: "secret.jwt.value".into(),
            otp: "123456".into(),
        };
        let debug = format!("{req:?}");
        assert!(!debug.contains("123456"));
        assert!(!debug.contains("secret.jwt"));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shares
//!
//! A [`Share`] is one file transfer, from upload to a terminal state.
//!
//! ```text
//!            ┌──────────► Downloaded
//!  Pending ──┼──────────► Revoked
//!            └──────────► Expired
//! ```
//!
//! Pending is the only non-terminal state. Every transition is a
//! compare-and-swap on `status == Pending` against the [`ShareStore`], so at
//! most one transition out of Pending ever applies.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::keyring::KeyVersion;
use crate::storage::StorageResult;

pub mod lifecycle;

pub use lifecycle::{LifecycleError, NewShare, ShareLifecycle, Transition};

/// Status of a share.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    Pending,
    Downloaded,
    Revoked,
    Expired,
}

impl ShareStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ShareStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShareStatus::Pending => "pending",
            ShareStatus::Downloaded => "downloaded",
            ShareStatus::Revoked => "revoked",
            ShareStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the access token (primary) and OTP (secondary) are delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub phone: String,
}

/// One file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Share {
    /// Opaque, unguessable, server-generated identifier.
    pub storage_token: String,
    /// Location of the ciphertext in the content store.
    pub blob_key: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub recipient: Recipient,
    /// Key version that wrapped the file key.
    pub key_version: KeyVersion,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ShareStatus,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Share {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == ShareStatus::Pending && now >= self.expires_at
    }

    /// Set `status` and stamp the matching terminal timestamp.
    pub fn apply_status(&mut self, status: ShareStatus, at: DateTime<Utc>) {
        self.status = status;
        match status {
            ShareStatus::Downloaded => self.downloaded_at = Some(at),
            ShareStatus::Revoked => self.revoked_at = Some(at),
            ShareStatus::Expired => self.expired_at = Some(at),
            ShareStatus::Pending => {}
        }
    }
}

/// Result of a conditional status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// Precondition held; the returned share carries the new status.
    Applied(Share),
    /// Precondition failed; the share is returned unchanged.
    Rejected(Share),
    /// No share with that token.
    Missing,
}

/// Relational store for share rows.
///
/// Implementations must make `compare_and_set_status` atomic with respect to
/// every other write, and must make a share visible to `list_pending` /
/// `pending_key_versions` in the same write that persists it.
pub trait ShareStore: Send + Sync {
    /// Persist a new share. Fails with `AlreadyExists` on a token collision.
    fn insert(&self, share: &Share) -> StorageResult<()>;

    fn get(&self, storage_token: &str) -> StorageResult<Option<Share>>;

    /// `UPDATE shares SET status = next WHERE token = ? AND status = expected`.
    fn compare_and_set_status(
        &self,
        storage_token: &str,
        expected: ShareStatus,
        next: ShareStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<CasOutcome>;

    fn list_pending(&self) -> StorageResult<Vec<Share>>;

    /// Key versions referenced by Pending shares.
    fn pending_key_versions(&self) -> StorageResult<BTreeSet<KeyVersion>> {
        Ok(self
            .list_pending()?
            .into_iter()
            .map(|share| share.key_version)
            .collect())
    }

    /// Shares uploaded by `sender_id`, newest first.
    fn list_by_sender(&self, sender_id: &str) -> StorageResult<Vec<Share>>;

    /// Cheap liveness probe.
    fn health_check(&self) -> StorageResult<()>;
}

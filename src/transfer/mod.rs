// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Orchestrator
//!
//! Drives the three user-facing flows across the lower layers.
//!
//! ## Upload
//!
//! ```text
//! validate → scan → rotate (if due) → lease key → seal → put ciphertext
//!          → create share → issue token + OTP → deliver (two channels)
//! ```
//!
//! Nothing is persisted for an infected or unscannable file. A failed share
//! insert removes the ciphertext again.
//!
//! ## Redeem
//!
//! ```text
//! validate (state before OTP) → fetch ciphertext → unwrap + decrypt
//!          → CAS Pending→Downloaded → delete ciphertext → schedule key GC
//! ```
//!
//! The plaintext is returned only after the CAS has applied. Redeems of the
//! same token are serialized in-process, so a simultaneous duplicate sees
//! `AlreadyDownloaded`.
//!
//! ## Revoke / expiry
//!
//! Both end with the ciphertext deleted and a key GC scheduled. Expiry is
//! observed through the lifecycle's expiry channel
//! ([`TransferService::run_expiry_listener`]).

pub mod sweeper;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::access::{AccessError, AccessProtocol, CapabilitySigner, DenialReason};
use crate::crypto::{self, CryptoError, Envelope, Iv};
use crate::delivery::{download_link, Notifier, PrimaryDelivery};
use crate::keyring::{KeyRing, KeyRingError, KeyVersion};
use crate::scanner::{MalwareScanner, ScanError};
use crate::shares::{LifecycleError, NewShare, Recipient, Share, ShareLifecycle, ShareStatus, Transition};
use crate::storage::{AuditEvent, AuditEventType, AuditLog, ContentStore, StorageError};

pub use sweeper::ExpirySweeper;

const MAX_FILE_NAME_CHARS: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("file rejected by malware scan")]
    VirusDetected(Vec<String>),

    #[error("malware scan unavailable: {0}")]
    ScanUnavailable(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    KeyRing(KeyRingError),

    #[error("access denied: {0}")]
    Denied(DenialReason),

    #[error("share not found")]
    NotFound,

    #[error("only the uploader may manage this share")]
    NotOwner,

    #[error("share is {0}")]
    InvalidState(ShareStatus),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<KeyRingError> for TransferError {
    fn from(err: KeyRingError) -> Self {
        match err {
            KeyRingError::Storage(e) => TransferError::Storage(e),
            other => TransferError::KeyRing(other),
        }
    }
}

impl From<LifecycleError> for TransferError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Storage(e) => TransferError::Storage(e),
            LifecycleError::NotFound => TransferError::NotFound,
            LifecycleError::InvalidState(status) => TransferError::InvalidState(status),
            LifecycleError::NotOwner => TransferError::NotOwner,
        }
    }
}

impl From<AccessError> for TransferError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied(reason) => TransferError::Denied(reason),
            AccessError::Storage(e) => TransferError::Storage(e),
            AccessError::Issue(e) => TransferError::Internal(e.to_string()),
        }
    }
}

impl From<ScanError> for TransferError {
    fn from(err: ScanError) -> Self {
        TransferError::ScanUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(err: tokio::task::JoinError) -> Self {
        TransferError::Internal(format!("blocking task failed: {err}"))
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Minimum age of the current key before an upload rotates it.
    /// Zero rotates on every upload.
    pub rotation_interval: Duration,
    /// Delay before a triggered key GC runs.
    pub gc_delay: Duration,
    /// Base URL of the recipient-facing download page.
    pub public_download_url: Url,
}

/// The collaborators the orchestrator drives.
pub struct TransferComponents {
    pub keyring: Arc<KeyRing>,
    pub lifecycle: Arc<ShareLifecycle>,
    pub access: AccessProtocol,
    pub content: Arc<dyn ContentStore>,
    pub scanner: Arc<dyn MalwareScanner>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<AuditLog>,
}

/// An upload as received from the sender.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub recipient_email: String,
    pub recipient_phone: String,
}

/// Result of a successful upload.
#[derive(Clone)]
pub struct UploadReceipt {
    pub share: Share,
    pub access_token: String,
    pub primary_delivered: bool,
    pub secondary_delivered: bool,
}

impl std::fmt::Debug for UploadReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadReceipt")
            .field("share", &self.share.storage_token)
            .field("access_token", &"<redacted>")
            .field("primary_delivered", &self.primary_delivered)
            .field("secondary_delivered", &self.secondary_delivered)
            .finish()
    }
}

/// Plaintext handed to the recipient.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub otps_purged: usize,
}

/// Delayed, coalesced key garbage collection.
///
/// Any number of triggers while a run is queued collapse into that run.
#[derive(Clone)]
pub struct GcTrigger {
    keyring: Arc<KeyRing>,
    lifecycle: Arc<ShareLifecycle>,
    audit: Arc<AuditLog>,
    delay: Duration,
    queued: Arc<AtomicBool>,
}

impl GcTrigger {
    fn new(
        keyring: Arc<KeyRing>,
        lifecycle: Arc<ShareLifecycle>,
        audit: Arc<AuditLog>,
        delay: Duration,
    ) -> Self {
        Self {
            keyring,
            lifecycle,
            audit,
            delay,
            queued: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fire-and-forget. Failures are logged, never surfaced.
    pub fn trigger(&self) {
        if self.queued.swap(true, Ordering::AcqRel) {
            debug!("Key GC already queued");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.queued.store(false, Ordering::Release);
            debug!("No runtime; skipping key GC");
            return;
        };

        let gc = self.clone();
        runtime.spawn(async move {
            tokio::time::sleep(gc.delay).await;
            // Clear before running so triggers that arrive mid-run queue
            // another pass.
            gc.queued.store(false, Ordering::Release);
            let worker = gc.clone();
            match tokio::task::spawn_blocking(move || worker.collect_now()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Key GC failed; will retry on next trigger"),
                Err(e) => warn!(error = %e, "Key GC task panicked"),
            }
        });
    }

    /// Run one GC pass on the calling thread.
    pub fn collect_now(&self) -> Result<Vec<KeyVersion>, KeyRingError> {
        let deleted = self.keyring.garbage_collect(self.lifecycle.as_ref())?;
        if !deleted.is_empty() {
            self.audit.record(
                AuditEvent::new(AuditEventType::KeysCollected)
                    .with_resource("key", self.keyring.current_version().to_string())
                    .with_details(serde_json::json!({
                        "deleted": deleted.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    })),
            );
        }
        Ok(deleted)
    }
}

type RedeemLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// The Transfer Orchestrator.
pub struct TransferService {
    keyring: Arc<KeyRing>,
    lifecycle: Arc<ShareLifecycle>,
    access: AccessProtocol,
    content: Arc<dyn ContentStore>,
    scanner: Arc<dyn MalwareScanner>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<AuditLog>,
    gc: GcTrigger,
    settings: TransferSettings,
    redeem_locks: RedeemLocks,
}

impl TransferService {
    pub fn new(components: TransferComponents, settings: TransferSettings) -> Self {
        let gc = GcTrigger::new(
            Arc::clone(&components.keyring),
            Arc::clone(&components.lifecycle),
            Arc::clone(&components.audit),
            settings.gc_delay,
        );
        Self {
            keyring: components.keyring,
            lifecycle: components.lifecycle,
            access: components.access,
            content: components.content,
            scanner: components.scanner,
            notifier: components.notifier,
            audit: components.audit,
            gc,
            settings,
            redeem_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    pub fn lifecycle(&self) -> &Arc<ShareLifecycle> {
        &self.lifecycle
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Scan, encrypt, persist and hand out access for one file.
    pub async fn initiate_upload(&self, request: UploadRequest) -> TransferResult<UploadReceipt> {
        let file_name = match validate_upload(&request) {
            Ok(name) => name,
            Err(e) => {
                self.audit_upload_rejected(&request.sender_id, &e);
                return Err(e);
            }
        };

        let verdict = match self.scanner.scan(&request.bytes).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(scanner = self.scanner.name(), error = %e, "Malware scan unavailable; rejecting upload");
                let err = TransferError::from(e);
                self.audit_upload_rejected(&request.sender_id, &err);
                return Err(err);
            }
        };
        if verdict.infected {
            warn!(
                sender_id = %request.sender_id,
                signatures = ?verdict.signatures,
                "Upload rejected: malware detected"
            );
            let err = TransferError::VirusDetected(verdict.signatures);
            self.audit_upload_rejected(&request.sender_id, &err);
            return Err(err);
        }

        self.rotate_if_due().await?;

        // The lease keeps this version safe from GC until the share that
        // references it is visible to `list_pending`.
        let lease = self.keyring.lease_current();
        let key_version = lease.version();
        let public_key = lease.public_key().clone();
        let size_bytes = request.bytes.len() as u64;
        let plaintext = request.bytes;
        let envelope =
            tokio::task::spawn_blocking(move || Envelope::seal(&plaintext, key_version, &public_key))
                .await??;

        let blob_key = format!("{}.enc", Uuid::new_v4());
        self.content.put(&blob_key, &envelope.ciphertext).await?;

        let created = self.lifecycle.create(NewShare {
            blob_key: blob_key.clone(),
            file_name,
            size_bytes,
            sender_id: request.sender_id.clone(),
            sender_email: request.sender_email,
            recipient: Recipient {
                email: request.recipient_email,
                phone: request.recipient_phone,
            },
            key_version,
        });
        let share = match created {
            Ok(share) => share,
            Err(e) => {
                if let Err(cleanup) = self.content.delete(&blob_key).await {
                    error!(blob_key = %blob_key, error = %cleanup, "Failed to remove orphaned ciphertext");
                }
                return Err(e.into());
            }
        };
        drop(lease);

        let issued = match self.access.issue(&share, &envelope) {
            Ok(issued) => issued,
            Err(e) => {
                error!(storage_token = %share.storage_token, error = %e, "Failed to issue access; expiring share");
                if let Err(expire_err) = self.lifecycle.transition_to_expired(&share.storage_token) {
                    warn!(storage_token = %share.storage_token, error = %expire_err, "Failed to expire share without access");
                }
                return Err(e.into());
            }
        };

        let link = download_link(&self.settings.public_download_url, &issued.token);
        let primary_delivered = match self
            .notifier
            .send_primary(PrimaryDelivery {
                contact: &share.recipient.email,
                token: &issued.token,
                link: &link,
                file_name: &share.file_name,
                expires_at: issued.expires_at,
            })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(storage_token = %share.storage_token, error = %e, "Primary delivery failed");
                false
            }
        };
        let secondary_delivered = match self
            .notifier
            .send_secondary(&share.recipient.phone, &issued.otp)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(storage_token = %share.storage_token, error = %e, "Secondary delivery failed");
                false
            }
        };

        self.audit.record(
            AuditEvent::new(AuditEventType::FileUploaded)
                .with_user(&share.sender_id)
                .for_share(&share.storage_token)
                .with_details(serde_json::json!({
                    "file_name": share.file_name,
                    "size_bytes": share.size_bytes,
                    "key_version": share.key_version,
                    "recipient_email": share.recipient.email,
                })),
        );
        self.audit.record(
            AuditEvent::new(AuditEventType::TokenIssued)
                .with_user(&share.sender_id)
                .for_share(&share.storage_token)
                .with_details(serde_json::json!({
                    "expires_at": issued.expires_at,
                    "primary_delivered": primary_delivered,
                    "secondary_delivered": secondary_delivered,
                })),
        );

        info!(
            storage_token = %share.storage_token,
            key_version = %share.key_version,
            size_bytes = share.size_bytes,
            "Upload complete"
        );
        Ok(UploadReceipt {
            share,
            access_token: issued.token,
            primary_delivered,
            secondary_delivered,
        })
    }

    async fn rotate_if_due(&self) -> TransferResult<()> {
        let keyring = Arc::clone(&self.keyring);
        let interval = self.settings.rotation_interval;
        if let Some(version) =
            tokio::task::spawn_blocking(move || keyring.rotate_if_due(interval)).await??
        {
            self.audit
                .record(AuditEvent::new(AuditEventType::KeyRotated).with_resource("key", version.to_string()));
        }
        Ok(())
    }

    fn audit_upload_rejected(&self, sender_id: &str, err: &TransferError) {
        let mut event = AuditEvent::new(AuditEventType::UploadRejected)
            .with_user(sender_id)
            .failed(err.to_string());
        if let TransferError::VirusDetected(signatures) = err {
            event = event.with_details(serde_json::json!({ "signatures": signatures }));
        }
        self.audit.record(event);
    }

    // =========================================================================
    // Redeem
    // =========================================================================

    /// Exchange a token + OTP for the plaintext, exactly once.
    pub async fn redeem(&self, token: &str, otp: &str) -> TransferResult<DownloadedFile> {
        let lock = self.redeem_lock(token);
        let guard = lock.lock().await;
        let result = self.redeem_serialized(token, otp).await;
        drop(guard);
        drop(lock);
        self.release_redeem_lock(token);
        result
    }

    fn redeem_lock(&self, token: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.redeem_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(token.to_string()).or_default())
    }

    fn release_redeem_lock(&self, token: &str) {
        let mut locks = self.redeem_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(token).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(token);
        }
    }

    /// Drop lock entries left behind by cancelled redeems.
    fn prune_redeem_locks(&self) {
        self.redeem_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    async fn redeem_serialized(&self, token: &str, otp: &str) -> TransferResult<DownloadedFile> {
        let access = match self.access.validate(token, otp) {
            Ok(access) => access,
            Err(AccessError::Denied(reason)) => {
                self.audit_denial(token, reason);
                return Err(TransferError::Denied(reason));
            }
            Err(e) => return Err(e.into()),
        };
        let share = access.share;
        let claims = access.claims;

        self.audit.record(
            AuditEvent::new(AuditEventType::OtpVerified).for_share(&share.storage_token),
        );

        let ciphertext = match self.content.get(&share.blob_key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => {
                error!(storage_token = %share.storage_token, "Ciphertext missing for pending share");
                return Err(TransferError::Denied(DenialReason::NotAvailable));
            }
            Err(e) => return Err(e.into()),
        };

        let wrapped_key =
            Base64::decode_vec(&claims.wrapped_key).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let iv = Iv::from_base64(&claims.iv)?;
        let keyring = Arc::clone(&self.keyring);
        let key_version = claims.key_version;
        let plaintext = tokio::task::spawn_blocking(move || -> TransferResult<Vec<u8>> {
            let private_key = keyring.resolve_private_key(key_version)?;
            Ok(crypto::open(&ciphertext, &wrapped_key, &iv, &private_key)?)
        })
        .await?
        .inspect_err(|e| {
            error!(storage_token = %share.storage_token, key_version = %key_version, error = %e, "Failed to decrypt share");
        })?;

        match self.lifecycle.transition_to_downloaded(&share.storage_token)? {
            Transition::Applied(_) => {}
            Transition::AlreadyTerminal(current) => {
                let reason = DenialReason::for_status(current.status).unwrap_or(DenialReason::NotAvailable);
                self.audit_denial(token, reason);
                return Err(TransferError::Denied(reason));
            }
        }

        if let Err(e) = self.content.delete(&share.blob_key).await {
            warn!(storage_token = %share.storage_token, error = %e, "Failed to delete ciphertext after download");
        }
        self.audit.record(
            AuditEvent::new(AuditEventType::FileDownloaded)
                .for_share(&share.storage_token)
                .with_details(serde_json::json!({
                    "file_name": share.file_name,
                    "key_version": share.key_version,
                })),
        );
        self.gc.trigger();

        Ok(DownloadedFile {
            file_name: share.file_name,
            bytes: plaintext,
        })
    }

    fn audit_denial(&self, token: &str, reason: DenialReason) {
        let event_type = if reason.is_otp_failure() {
            AuditEventType::OtpRejected
        } else {
            AuditEventType::DownloadDenied
        };
        let mut event = AuditEvent::new(event_type).failed(reason.code());
        // Attribute the attempt to a share when the token names one.
        if let Some(storage_token) = CapabilitySigner::peek_storage_token(token) {
            event = event.for_share(storage_token);
        }
        self.audit.record(event);
        debug!(reason = %reason, "Redeem denied");
    }

    // =========================================================================
    // Revoke / expiry
    // =========================================================================

    /// Revoke a Pending share on behalf of its uploader.
    pub async fn revoke(&self, storage_token: &str, actor: &str) -> TransferResult<Share> {
        let share = self.lifecycle.transition_to_revoked(storage_token, actor)?;

        if let Err(e) = self.content.delete(&share.blob_key).await {
            warn!(storage_token = %storage_token, error = %e, "Failed to delete ciphertext after revoke");
        }
        if let Err(e) = self
            .notifier
            .send_revocation(&share.recipient.email, &share.file_name)
            .await
        {
            warn!(storage_token = %storage_token, error = %e, "Revocation notice failed");
        }
        self.audit.record(
            AuditEvent::new(AuditEventType::FileRevoked)
                .with_user(actor)
                .for_share(storage_token),
        );
        self.gc.trigger();
        Ok(share)
    }

    /// Clean up after a share moved to Expired.
    pub async fn handle_expired(&self, share: &Share) {
        if let Err(e) = self.content.delete(&share.blob_key).await {
            warn!(storage_token = %share.storage_token, error = %e, "Failed to delete ciphertext of expired share");
        }
        self.audit.record(
            AuditEvent::new(AuditEventType::ShareExpired)
                .with_user(&share.sender_id)
                .for_share(&share.storage_token),
        );
        self.gc.trigger();
    }

    /// Consume expiry events until the channel closes or `shutdown` fires.
    pub async fn run_expiry_listener(
        self: Arc<Self>,
        mut expired: mpsc::UnboundedReceiver<Share>,
        shutdown: CancellationToken,
    ) {
        info!("Expiry listener starting");
        loop {
            tokio::select! {
                next = expired.recv() => match next {
                    Some(share) => self.handle_expired(&share).await,
                    None => {
                        info!("Expiry channel closed; listener stopping");
                        return;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Expiry listener shutting down");
                    return;
                }
            }
        }
    }

    /// Expire overdue Pending shares and purge stale OTP records.
    ///
    /// Expired shares are published on the expiry channel; their ciphertext is
    /// removed by the listener.
    pub fn sweep(&self, now: DateTime<Utc>) -> TransferResult<SweepReport> {
        let expired = self.lifecycle.expire_overdue(now)?.len();
        let otps_purged = self.access.purge_expired_otps();
        self.prune_redeem_locks();
        Ok(SweepReport {
            expired,
            otps_purged,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The sender's shares, newest first.
    pub fn list_shares(&self, sender_id: &str) -> TransferResult<Vec<Share>> {
        Ok(self.lifecycle.list_for_sender(sender_id)?)
    }

    /// One of the sender's shares. Other senders' shares are reported as
    /// [`TransferError::NotOwner`].
    pub fn share_status(&self, storage_token: &str, sender_id: &str) -> TransferResult<Share> {
        let share = self
            .lifecycle
            .get(storage_token)?
            .ok_or(TransferError::NotFound)?;
        if share.sender_id != sender_id {
            return Err(TransferError::NotOwner);
        }
        Ok(share)
    }
}

/// Check an upload request and return the cleaned file name.
fn validate_upload(request: &UploadRequest) -> TransferResult<String> {
    let file_name = sanitize_file_name(&request.file_name)
        .ok_or_else(|| TransferError::Validation("A file name is required".to_string()))?;
    let email = request.recipient_email.trim();
    if email.is_empty() {
        return Err(TransferError::Validation("Recipient email is required".to_string()));
    }
    if !email.contains('@') {
        return Err(TransferError::Validation("Recipient email is invalid".to_string()));
    }
    if request.recipient_phone.trim().is_empty() {
        return Err(TransferError::Validation(
            "Recipient phone is required for the one-time code".to_string(),
        ));
    }
    Ok(file_name)
}

/// Keep only the final path component, without control characters.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share lifecycle state machine.
//!
//! ## Expiry
//!
//! Three mechanisms move an overdue share to Expired, all through the same
//! compare-and-swap:
//!
//! 1. A local timer scheduled at `create` (does not survive a restart).
//! 2. Lazy expiry on every read of a Pending share past its deadline.
//! 3. [`ShareLifecycle::expire_overdue`], driven by the periodic sweeper.
//!
//! Every applied Expired transition is published once on the channel returned
//! by [`ShareLifecycle::new`] so the owner of the ciphertext can delete it.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{CasOutcome, Recipient, Share, ShareStatus, ShareStore};
use crate::keyring::{KeyUsage, KeyVersion};
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("share not found")]
    NotFound,

    #[error("share is {0}")]
    InvalidState(ShareStatus),

    #[error("only the uploader may revoke a share")]
    NotOwner,
}

/// Outcome of a conditional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the share out of Pending.
    Applied(Share),
    /// Someone else already did; the share is returned as found.
    AlreadyTerminal(Share),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn share(&self) -> &Share {
        match self {
            Transition::Applied(share) | Transition::AlreadyTerminal(share) => share,
        }
    }
}

/// Everything needed to persist a new share.
#[derive(Debug, Clone)]
pub struct NewShare {
    pub blob_key: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub sender_id: String,
    pub sender_email: Option<String>,
    pub recipient: Recipient,
    pub key_version: KeyVersion,
}

/// Authoritative model of share state on top of a [`ShareStore`].
pub struct ShareLifecycle {
    store: Arc<dyn ShareStore>,
    ttl: Duration,
    timers: Mutex<HashMap<String, AbortHandle>>,
    expired_tx: mpsc::UnboundedSender<Share>,
}

impl ShareLifecycle {
    /// Create the lifecycle and the receiving end of the expiry channel.
    pub fn new(
        store: Arc<dyn ShareStore>,
        ttl: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Share>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let lifecycle = Arc::new(Self {
            store,
            ttl,
            timers: Mutex::new(HashMap::new()),
            expired_tx,
        });
        (lifecycle, expired_rx)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn ShareStore> {
        &self.store
    }

    /// Persist a new Pending share with `expires_at = now + ttl` and start
    /// its expiry timer.
    ///
    /// The share (and its key version) is visible to `list_pending` as soon
    /// as this returns.
    pub fn create(self: &Arc<Self>, new_share: NewShare) -> Result<Share, LifecycleError> {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let share = Share {
            storage_token: generate_storage_token(),
            blob_key: new_share.blob_key,
            file_name: new_share.file_name,
            size_bytes: new_share.size_bytes,
            sender_id: new_share.sender_id,
            sender_email: new_share.sender_email,
            recipient: new_share.recipient,
            key_version: new_share.key_version,
            created_at,
            expires_at,
            status: ShareStatus::Pending,
            downloaded_at: None,
            revoked_at: None,
            expired_at: None,
        };

        self.store.insert(&share)?;
        self.schedule_expiry(&share.storage_token, self.ttl);

        info!(
            storage_token = %share.storage_token,
            key_version = %share.key_version,
            expires_at = %share.expires_at,
            "Share created"
        );
        Ok(share)
    }

    fn schedule_expiry(self: &Arc<Self>, storage_token: &str, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(storage_token = %storage_token, "No runtime; share relies on lazy expiry");
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let token = storage_token.to_string();

        // Hold the map lock across spawn so the task cannot remove its entry
        // before it has been inserted.
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(lifecycle) = weak.upgrade() else {
                return;
            };
            lifecycle.forget_timer(&token);
            match lifecycle.transition_to_expired(&token) {
                Ok(Transition::Applied(_)) => {}
                Ok(Transition::AlreadyTerminal(share)) => {
                    debug!(storage_token = %token, status = %share.status, "Expiry timer fired after terminal transition");
                }
                Err(e) => {
                    warn!(storage_token = %token, error = %e, "Expiry timer failed; sweeper will retry");
                }
            }
        });
        timers.insert(storage_token.to_string(), task.abort_handle());
    }

    fn forget_timer(&self, storage_token: &str) {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(storage_token);
    }

    /// Abort the local expiry timer, if one is still scheduled.
    pub fn cancel_timer(&self, storage_token: &str) {
        let handle = self
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(storage_token);
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Number of expiry timers still scheduled.
    pub fn scheduled_timers(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn transition(
        &self,
        storage_token: &str,
        next: ShareStatus,
    ) -> Result<Transition, LifecycleError> {
        match self
            .store
            .compare_and_set_status(storage_token, ShareStatus::Pending, next, Utc::now())?
        {
            CasOutcome::Applied(share) => Ok(Transition::Applied(share)),
            CasOutcome::Rejected(share) => Ok(Transition::AlreadyTerminal(share)),
            CasOutcome::Missing => Err(LifecycleError::NotFound),
        }
    }

    /// Pending → Downloaded.
    pub fn transition_to_downloaded(
        &self,
        storage_token: &str,
    ) -> Result<Transition, LifecycleError> {
        let outcome = self.transition(storage_token, ShareStatus::Downloaded)?;
        if outcome.is_applied() {
            self.cancel_timer(storage_token);
            info!(storage_token = %storage_token, "Share downloaded");
        }
        Ok(outcome)
    }

    /// Pending → Expired. A share that already left Pending is a no-op.
    pub fn transition_to_expired(&self, storage_token: &str) -> Result<Transition, LifecycleError> {
        let outcome = self.transition(storage_token, ShareStatus::Expired)?;
        if let Transition::Applied(share) = &outcome {
            self.cancel_timer(storage_token);
            info!(storage_token = %storage_token, "Share expired");
            if self.expired_tx.send(share.clone()).is_err() {
                debug!(storage_token = %storage_token, "No expiry listener attached");
            }
        }
        Ok(outcome)
    }

    /// Pending → Revoked, by the uploader only.
    pub fn transition_to_revoked(
        &self,
        storage_token: &str,
        actor: &str,
    ) -> Result<Share, LifecycleError> {
        let share = self.get(storage_token)?.ok_or(LifecycleError::NotFound)?;
        if share.sender_id != actor {
            return Err(LifecycleError::NotOwner);
        }
        if share.status.is_terminal() {
            return Err(LifecycleError::InvalidState(share.status));
        }

        match self.transition(storage_token, ShareStatus::Revoked)? {
            Transition::Applied(share) => {
                self.cancel_timer(storage_token);
                info!(storage_token = %storage_token, "Share revoked");
                Ok(share)
            }
            Transition::AlreadyTerminal(share) => Err(LifecycleError::InvalidState(share.status)),
        }
    }

    /// Bring an overdue Pending share up to date.
    fn refresh(&self, share: Share) -> Result<Share, LifecycleError> {
        if !share.is_overdue(Utc::now()) {
            return Ok(share);
        }
        match self.transition_to_expired(&share.storage_token) {
            Ok(outcome) => Ok(outcome.share().clone()),
            Err(LifecycleError::NotFound) => Ok(share),
            Err(e) => Err(e),
        }
    }

    /// Fetch a share, applying lazy expiry.
    pub fn get(&self, storage_token: &str) -> Result<Option<Share>, LifecycleError> {
        match self.store.get(storage_token)? {
            Some(share) => self.refresh(share).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_status(&self, storage_token: &str) -> Result<ShareStatus, LifecycleError> {
        self.get(storage_token)?
            .map(|share| share.status)
            .ok_or(LifecycleError::NotFound)
    }

    pub fn list_pending(&self) -> Result<Vec<Share>, LifecycleError> {
        Ok(self.store.list_pending()?)
    }

    /// Shares uploaded by `sender_id`, newest first, with lazy expiry applied.
    pub fn list_for_sender(&self, sender_id: &str) -> Result<Vec<Share>, LifecycleError> {
        self.store
            .list_by_sender(sender_id)?
            .into_iter()
            .map(|share| self.refresh(share))
            .collect()
    }

    /// Expire every Pending share whose deadline is at or before `now`.
    /// Returns the shares this call moved to Expired.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Share>, LifecycleError> {
        let mut expired = Vec::new();
        for share in self.store.list_pending()? {
            if !share.is_overdue(now) {
                continue;
            }
            match self.transition_to_expired(&share.storage_token) {
                Ok(Transition::Applied(share)) => expired.push(share),
                Ok(Transition::AlreadyTerminal(_)) | Err(LifecycleError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}

impl KeyUsage for ShareLifecycle {
    fn pending_key_versions(&self) -> Result<BTreeSet<KeyVersion>, StorageError> {
        self.store.pending_key_versions()
    }
}

/// 128 bits from the OS RNG, hex encoded.
fn generate_storage_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryShareStore, ShareDatabase};
    use tempfile::TempDir;

    fn new_share(sender: &str, version: u32) -> NewShare {
        NewShare {
            blob_key: format!("{}.enc", Uuid::new_v4()),
            file_name: "report.pdf".to_string(),
            size_bytes: 11,
            sender_id: sender.to_string(),
            sender_email: None,
            recipient: Recipient {
                email: "bob@example.com".to_string(),
                phone: "+15550100".to_string(),
            },
            key_version: KeyVersion::new(version),
        }
    }

    fn memory_lifecycle(
        ttl: Duration,
    ) -> (
        Arc<ShareLifecycle>,
        mpsc::UnboundedReceiver<Share>,
        Arc<MemoryShareStore>,
    ) {
        let store = Arc::new(MemoryShareStore::new());
        let (lifecycle, rx) = ShareLifecycle::new(store.clone(), ttl);
        (lifecycle, rx, store)
    }

    #[test]
    fn create_persists_pending_share_with_deadline() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::from_secs(300));
        let share = lifecycle.create(new_share("alice", 1)).unwrap();

        assert_eq!(share.status, ShareStatus::Pending);
        assert_eq!(share.storage_token.len(), 32);
        assert_eq!(
            share.expires_at - share.created_at,
            chrono::Duration::seconds(300)
        );
        assert_eq!(
            lifecycle.get_status(&share.storage_token).unwrap(),
            ShareStatus::Pending
        );
        assert_eq!(
            lifecycle.pending_key_versions().unwrap(),
            [KeyVersion::new(1)].into_iter().collect()
        );
    }

    #[test]
    fn storage_tokens_are_unique() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::from_secs(300));
        let a = lifecycle.create(new_share("alice", 1)).unwrap();
        let b = lifecycle.create(new_share("alice", 1)).unwrap();
        assert_ne!(a.storage_token, b.storage_token);
    }

    #[test]
    fn terminal_states_are_final() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::from_secs(300));
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

        assert!(lifecycle.transition_to_downloaded(&token).unwrap().is_applied());

        let again = lifecycle.transition_to_expired(&token).unwrap();
        assert_eq!(again.share().status, ShareStatus::Downloaded);
        assert!(!again.is_applied());

        assert!(matches!(
            lifecycle.transition_to_revoked(&token, "alice"),
            Err(LifecycleError::InvalidState(ShareStatus::Downloaded))
        ));
        assert!(!lifecycle.transition_to_downloaded(&token).unwrap().is_applied());
        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Downloaded);
    }

    #[test]
    fn revoke_requires_owner() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::from_secs(300));
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

        assert!(matches!(
            lifecycle.transition_to_revoked(&token, "mallory"),
            Err(LifecycleError::NotOwner)
        ));
        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Pending);

        let revoked = lifecycle.transition_to_revoked(&token, "alice").unwrap();
        assert_eq!(revoked.status, ShareStatus::Revoked);
        assert!(revoked.revoked_at.is_some());
    }

    #[test]
    fn unknown_token_is_not_found() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::from_secs(300));
        assert!(matches!(
            lifecycle.get_status("nope"),
            Err(LifecycleError::NotFound)
        ));
        assert!(matches!(
            lifecycle.transition_to_downloaded("nope"),
            Err(LifecycleError::NotFound)
        ));
        assert!(matches!(
            lifecycle.transition_to_revoked("nope", "alice"),
            Err(LifecycleError::NotFound)
        ));
    }

    #[test]
    fn store_outage_surfaces_as_storage_error_without_mutation() {
        let (lifecycle, _rx, store) = memory_lifecycle(Duration::from_secs(300));
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

        store.set_unavailable(true);
        assert!(matches!(
            lifecycle.transition_to_downloaded(&token),
            Err(LifecycleError::Storage(StorageError::Unavailable(_)))
        ));
        assert!(matches!(
            lifecycle.create(new_share("alice", 1)),
            Err(LifecycleError::Storage(_))
        ));

        store.set_unavailable(false);
        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Pending);
    }

    #[test]
    fn lazy_expiry_on_read_publishes_once() {
        let (lifecycle, mut rx, _store) = memory_lifecycle(Duration::ZERO);
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Expired);
        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Expired);

        let published = rx.try_recv().unwrap();
        assert_eq!(published.storage_token, token);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn revoke_of_overdue_share_reports_expired() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::ZERO);
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;
        assert!(matches!(
            lifecycle.transition_to_revoked(&token, "alice"),
            Err(LifecycleError::InvalidState(ShareStatus::Expired))
        ));
    }

    #[test]
    fn expire_overdue_only_touches_overdue_pending() {
        let store = Arc::new(MemoryShareStore::new());
        let (lifecycle, mut rx) = ShareLifecycle::new(store.clone(), Duration::from_secs(300));
        let fresh = lifecycle.create(new_share("alice", 1)).unwrap();
        let done = lifecycle.create(new_share("alice", 1)).unwrap();
        lifecycle.transition_to_downloaded(&done.storage_token).unwrap();

        let later = Utc::now() + chrono::Duration::minutes(6);
        let expired = lifecycle.expire_overdue(later).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].storage_token, fresh.storage_token);
        assert_eq!(rx.try_recv().unwrap().storage_token, fresh.storage_token);

        assert!(lifecycle.expire_overdue(later).unwrap().is_empty());
        assert_eq!(
            lifecycle.get_status(&done.storage_token).unwrap(),
            ShareStatus::Downloaded
        );
    }

    #[test]
    fn list_for_sender_applies_lazy_expiry() {
        let (lifecycle, _rx, _store) = memory_lifecycle(Duration::ZERO);
        lifecycle.create(new_share("alice", 1)).unwrap();
        lifecycle.create(new_share("bob", 1)).unwrap();

        let shares = lifecycle.list_for_sender("alice").unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].status, ShareStatus::Expired);
    }

    #[tokio::test]
    async fn timer_expires_share_and_publishes() {
        let (lifecycle, mut rx, _store) = memory_lifecycle(Duration::from_millis(50));
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;
        assert_eq!(lifecycle.scheduled_timers(), 1);

        let published = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.storage_token, token);
        assert_eq!(published.status, ShareStatus::Expired);
        assert_eq!(lifecycle.scheduled_timers(), 0);
    }

    #[tokio::test]
    async fn download_cancels_timer() {
        let (lifecycle, mut rx, _store) = memory_lifecycle(Duration::from_millis(50));
        let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

        lifecycle.transition_to_downloaded(&token).unwrap();
        assert_eq!(lifecycle.scheduled_timers(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(lifecycle.get_status(&token).unwrap(), ShareStatus::Downloaded);
    }

    #[test]
    fn racing_transitions_have_one_winner() {
        for _ in 0..20 {
            let temp = TempDir::new().unwrap();
            let db = ShareDatabase::open(&temp.path().join("shares.redb")).unwrap();
            let (lifecycle, _rx) = ShareLifecycle::new(Arc::new(db), Duration::from_secs(300));
            let token = lifecycle.create(new_share("alice", 1)).unwrap().storage_token;

            let download = {
                let lifecycle = Arc::clone(&lifecycle);
                let token = token.clone();
                std::thread::spawn(move || lifecycle.transition_to_downloaded(&token).unwrap().is_applied())
            };
            let revoke = {
                let lifecycle = Arc::clone(&lifecycle);
                let token = token.clone();
                std::thread::spawn(move || lifecycle.transition_to_revoked(&token, "alice").is_ok())
            };
            let expire = {
                let lifecycle = Arc::clone(&lifecycle);
                let token = token.clone();
                std::thread::spawn(move || lifecycle.transition_to_expired(&token).unwrap().is_applied())
            };

            let winners = [download, revoke, expire]
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
            assert!(lifecycle.get_status(&token).unwrap().is_terminal());
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory [`ShareStore`] for tests and single-process demos.
//!
//! One mutex guards the whole map, which is enough to make
//! `compare_and_set_status` atomic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{StorageError, StorageResult};
use crate::shares::{CasOutcome, Share, ShareStatus, ShareStore};

#[derive(Debug, Default)]
pub struct MemoryShareStore {
    shares: Mutex<HashMap<String, Share>>,
    unavailable: AtomicBool,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn guard(&self) -> StorageResult<MutexGuard<'_, HashMap<String, Share>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("share store offline".to_string()));
        }
        self.shares
            .lock()
            .map_err(|_| StorageError::Unavailable("share store lock poisoned".to_string()))
    }
}

impl ShareStore for MemoryShareStore {
    fn insert(&self, share: &Share) -> StorageResult<()> {
        let mut shares = self.guard()?;
        if shares.contains_key(&share.storage_token) {
            return Err(StorageError::AlreadyExists(format!(
                "share {}",
                share.storage_token
            )));
        }
        shares.insert(share.storage_token.clone(), share.clone());
        Ok(())
    }

    fn get(&self, storage_token: &str) -> StorageResult<Option<Share>> {
        Ok(self.guard()?.get(storage_token).cloned())
    }

    fn compare_and_set_status(
        &self,
        storage_token: &str,
        expected: ShareStatus,
        next: ShareStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<CasOutcome> {
        let mut shares = self.guard()?;
        let Some(share) = shares.get_mut(storage_token) else {
            return Ok(CasOutcome::Missing);
        };
        if share.status != expected {
            return Ok(CasOutcome::Rejected(share.clone()));
        }
        share.apply_status(next, at);
        Ok(CasOutcome::Applied(share.clone()))
    }

    fn list_pending(&self) -> StorageResult<Vec<Share>> {
        Ok(self
            .guard()?
            .values()
            .filter(|share| share.status == ShareStatus::Pending)
            .cloned()
            .collect())
    }

    fn list_by_sender(&self, sender_id: &str) -> StorageResult<Vec<Share>> {
        let mut shares: Vec<Share> = self
            .guard()?
            .values()
            .filter(|share| share.sender_id == sender_id)
            .cloned()
            .collect();
        shares.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shares)
    }

    fn health_check(&self) -> StorageResult<()> {
        self.guard().map(|_| ())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded share database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `shares`: storage_token → serialized Share (JSON bytes)
//! - `pending_index`: storage_token → key version, for Pending shares only
//! - `sender_index`: composite key (sender|!created_at|storage_token) → storage_token
//!
//! redb runs one write transaction at a time, so the read-check-write inside
//! [`ShareDatabase::compare_and_set_status`] is a real compare-and-swap.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{StorageError, StorageResult};
use crate::keyring::KeyVersion;
use crate::shares::{CasOutcome, Share, ShareStatus, ShareStore};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: storage_token → serialized Share (JSON bytes).
const SHARES: TableDefinition<&str, &[u8]> = TableDefinition::new("shares");

/// Index of Pending shares: storage_token → key version number.
const PENDING_INDEX: TableDefinition<&str, u32> = TableDefinition::new("pending_index");

/// Index: composite key → storage_token.
/// Key format: `len(sender)_be16 | sender | !created_at_millis_be | storage_token`.
const SENDER_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("sender_index");

// =============================================================================
// Error Conversion
// =============================================================================

macro_rules! impl_from_redb {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for StorageError {
                fn from(e: $err) -> Self {
                    StorageError::Database(e.to_string())
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Length-prefixed sender so one sender id can never be a prefix of another.
fn sender_prefix(sender_id: &str) -> Vec<u8> {
    let sender = sender_id.as_bytes();
    let len = u16::try_from(sender.len()).unwrap_or(u16::MAX);
    let mut prefix = Vec::with_capacity(2 + sender.len());
    prefix.extend_from_slice(&len.to_be_bytes());
    prefix.extend_from_slice(&sender[..usize::from(len)]);
    prefix
}

/// The inverted timestamp gives newest-first ordering on a forward scan.
fn sender_index_key(sender_id: &str, created_at: DateTime<Utc>, storage_token: &str) -> Vec<u8> {
    let mut key = sender_prefix(sender_id);
    key.extend_from_slice(&(!(created_at.timestamp_millis() as u64)).to_be_bytes());
    key.extend_from_slice(storage_token.as_bytes());
    key
}

// =============================================================================
// ShareDatabase
// =============================================================================

/// redb-backed [`ShareStore`].
pub struct ShareDatabase {
    db: Database,
}

impl ShareDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SHARES)?;
            let _ = write_txn.open_table(PENDING_INDEX)?;
            let _ = write_txn.open_table(SENDER_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

impl ShareStore for ShareDatabase {
    fn insert(&self, share: &Share) -> StorageResult<()> {
        let json = serde_json::to_vec(share)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut shares = write_txn.open_table(SHARES)?;
            if shares.get(share.storage_token.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!(
                    "share {}",
                    share.storage_token
                )));
            }
            shares.insert(share.storage_token.as_str(), json.as_slice())?;

            // Visible to pending_key_versions in the same commit as the row.
            if share.status == ShareStatus::Pending {
                let mut pending = write_txn.open_table(PENDING_INDEX)?;
                pending.insert(share.storage_token.as_str(), share.key_version.get())?;
            }

            let mut by_sender = write_txn.open_table(SENDER_INDEX)?;
            let key = sender_index_key(&share.sender_id, share.created_at, &share.storage_token);
            by_sender.insert(key.as_slice(), share.storage_token.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, storage_token: &str) -> StorageResult<Option<Share>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES)?;
        match table.get(storage_token)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn compare_and_set_status(
        &self,
        storage_token: &str,
        expected: ShareStatus,
        next: ShareStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<CasOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut shares = write_txn.open_table(SHARES)?;

            // Read existing value and deserialize before mutating
            let existing_bytes = shares
                .get(storage_token)?
                .map(|existing| existing.value().to_vec());

            match existing_bytes {
                None => CasOutcome::Missing,
                Some(bytes) => {
                    let mut share: Share = serde_json::from_slice(&bytes)?;
                    if share.status != expected {
                        CasOutcome::Rejected(share)
                    } else {
                        share.apply_status(next, at);
                        let json = serde_json::to_vec(&share)?;
                        shares.insert(storage_token, json.as_slice())?;

                        if next != ShareStatus::Pending {
                            let mut pending = write_txn.open_table(PENDING_INDEX)?;
                            pending.remove(storage_token)?;
                        }
                        CasOutcome::Applied(share)
                    }
                }
            }
        };

        match outcome {
            CasOutcome::Applied(_) => write_txn.commit()?,
            _ => write_txn.abort()?,
        }
        Ok(outcome)
    }

    fn list_pending(&self) -> StorageResult<Vec<Share>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_INDEX)?;
        let shares = read_txn.open_table(SHARES)?;

        let mut results = Vec::new();
        for entry in pending.iter()? {
            let (token, _) = entry?;
            if let Some(value) = shares.get(token.value())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    fn pending_key_versions(&self) -> StorageResult<BTreeSet<KeyVersion>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING_INDEX)?;

        let mut versions = BTreeSet::new();
        for entry in pending.iter()? {
            let (_, version) = entry?;
            versions.insert(KeyVersion::new(version.value()));
        }
        Ok(versions)
    }

    fn list_by_sender(&self, sender_id: &str) -> StorageResult<Vec<Share>> {
        let read_txn = self.db.begin_read()?;
        let by_sender = read_txn.open_table(SENDER_INDEX)?;
        let shares = read_txn.open_table(SHARES)?;

        let prefix = sender_prefix(sender_id);
        let mut results = Vec::new();
        for entry in by_sender.range(prefix.as_slice()..)? {
            let (key, token) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            if let Some(value) = shares.get(token.value())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    fn health_check(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(SHARES)?;
        Ok(())
    }
}

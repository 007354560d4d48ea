// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the storage layout.

use std::path::{Path, PathBuf};

/// Default base directory for all persistent storage.
pub const DATA_ROOT: &str = "./data";

/// Longest accepted blob key.
const MAX_BLOB_KEY_LEN: usize = 128;

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Blob Paths ==========

    /// Directory containing envelope ciphertext.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path to one ciphertext blob. The key must pass [`is_safe_blob_key`].
    pub fn blob(&self, key: &str) -> PathBuf {
        self.blobs_dir().join(key)
    }

    // ========== Key Ring Paths ==========

    /// Directory holding versioned key pairs and the version pointer.
    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    // ========== Database Paths ==========

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// The redb file backing share rows.
    pub fn database_file(&self) -> PathBuf {
        self.database_dir().join("shares.redb")
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

/// Blob keys are server generated; anything that could escape the blob
/// directory is refused.
pub fn is_safe_blob_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_BLOB_KEY_LEN
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

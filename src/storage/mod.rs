// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistence for the transfer pipeline.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   blobs/
//!     {uuid}.enc           # Envelope ciphertext (never plaintext)
//!   keys/
//!     key-version.json     # Current key version pointer
//!     private_v{n}.pem
//!     public_v{n}.pem
//!   db/
//!     shares.redb          # Share rows + pending/sender indexes
//!   audit/
//!     {date}/events.jsonl  # Daily audit logs
//! ```
//!
//! Ciphertext goes through the [`ContentStore`] trait, share rows through the
//! [`ShareStore`](crate::shares::ShareStore) trait implemented by
//! [`ShareDatabase`] (redb) and [`MemoryShareStore`].

use std::io;

pub mod audit;
pub mod content;
pub mod memory;
pub mod paths;
pub mod share_db;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use content::{ContentStore, FsContentStore, MemoryContentStore};
pub use memory::MemoryShareStore;
pub use paths::StoragePaths;
pub use share_db::ShareDatabase;

/// Error type for storage operations.
///
/// Storage failures are transient infrastructure errors: the caller may retry
/// the whole request, and nothing is ever partially applied.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content store for envelope ciphertext.
//!
//! Only ciphertext ever reaches this layer. Keys are flat names generated by
//! the orchestrator (`{uuid}.enc`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use super::paths::is_safe_blob_key;
use super::{StorageError, StoragePaths, StorageResult};

/// Blob storage used for ciphertext.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Verify the store is writable.
    async fn health_check(&self) -> StorageResult<()>;
}

fn check_key(key: &str) -> StorageResult<()> {
    if is_safe_blob_key(key) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Filesystem content store rooted at `{DATA_DIR}/blobs`.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    paths: StoragePaths,
}

impl FsContentStore {
    /// Create the store, creating the blob directory if needed.
    pub async fn open(paths: StoragePaths) -> StorageResult<Self> {
        fs::create_dir_all(paths.blobs_dir()).await?;
        Ok(Self { paths })
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        check_key(key)?;
        let path = self.paths.blob(key);
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, bytes).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        check_key(key)?;
        match fs::read(self.paths.blob(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_key(key)?;
        match fs::remove_file(self.paths.blob(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write-read-delete round trip in the blob directory.
    async fn health_check(&self) -> StorageResult<()> {
        let test_file = self.paths.blobs_dir().join(".health_check");
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data).await?;
        let read_data = fs::read(&test_file).await?;
        fs::remove_file(&test_file).await?;

        if read_data != test_data {
            return Err(StorageError::Unavailable(
                "health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory content store. Used by tests and for ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every blob, as if they were lost out from under the service.
    pub fn clear(&self) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.clear();
        }
    }

    fn guard(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("content store offline".to_string()));
        }
        self.blobs
            .lock()
            .map_err(|_| StorageError::Unavailable("content store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        check_key(key)?;
        self.guard()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        check_key(key)?;
        self.guard()?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("blob {key}")))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_key(key)?;
        self.guard()?.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.guard().map(|_| ())
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Ring Manager
//!
//! Versioned RSA key pairs used to wrap per-file keys.
//!
//! ## On-disk layout
//!
//! ```text
//! {DATA_DIR}/keys/
//!   key-version.json    # {"current_version": 3, "rotated_at": "..."}
//!   private_v{n}.pem    # PKCS#8
//!   public_v{n}.pem     # SPKI
//! ```
//!
//! ## Version states
//!
//! Exactly one version is `current`. A previous version is `retiring` while
//! its files remain on disk and `deleted` once garbage collected. A version
//! referenced by a Pending share, or leased by an upload in flight, is never
//! collected.
//!
//! `rotate()` and `garbage_collect()` are serialized on one mutex. Uploads
//! take a [`KeyLease`] instead of reading the current version directly, so
//! the window between "key wrapped" and "share visible to `list_pending`" is
//! covered by the lease.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::storage::StorageError;

const METADATA_FILE: &str = "key-version.json";

/// Identifier of one generation of the key pair. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyVersion(u32);

impl KeyVersion {
    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).filter(|v| *v > 0).map(Self)
    }
}

impl std::fmt::Display for KeyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Lifecycle state of a key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Current,
    Retiring,
    Deleted,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyRingError {
    #[error("key version {0} not found")]
    NotFound(KeyVersion),

    #[error("key ring I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("key ring metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("key encoding error: {0}")]
    Encoding(String),

    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("pending share lookup failed: {0}")]
    Storage(#[from] StorageError),
}

pub type KeyRingResult<T> = Result<T, KeyRingError>;

/// Source of key versions still referenced by Pending shares.
pub trait KeyUsage: Send + Sync {
    fn pending_key_versions(&self) -> Result<BTreeSet<KeyVersion>, StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionMetadata {
    current_version: KeyVersion,
    rotated_at: DateTime<Utc>,
}

struct CurrentKey {
    version: KeyVersion,
    public_key: Arc<RsaPublicKey>,
    rotated_at: DateTime<Utc>,
}

type LeaseCounts = Arc<Mutex<BTreeMap<KeyVersion, usize>>>;

/// A consistent `(version, public key)` snapshot held by an upload in flight.
///
/// While the lease is alive its version is protected from garbage collection.
pub struct KeyLease {
    version: KeyVersion,
    public_key: Arc<RsaPublicKey>,
    leases: LeaseCounts,
}

impl KeyLease {
    pub fn version(&self) -> KeyVersion {
        self.version
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = leases.get_mut(&self.version) {
            *count -= 1;
            if *count == 0 {
                leases.remove(&self.version);
            }
        }
    }
}

impl std::fmt::Debug for KeyLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLease")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Versioned key pairs with rotation and retention.
pub struct KeyRing {
    dir: PathBuf,
    bits: usize,
    current: RwLock<CurrentKey>,
    leases: LeaseCounts,
    rotation: Mutex<()>,
}

impl KeyRing {
    /// Open the key ring in `dir`, minting `v1` when the directory is empty.
    ///
    /// `bits` is the modulus size used for versions minted from now on.
    pub fn open(dir: impl AsRef<Path>, bits: usize) -> KeyRingResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let metadata_path = dir.join(METADATA_FILE);
        let current = match fs::read(&metadata_path) {
            Ok(bytes) => {
                let meta: VersionMetadata = serde_json::from_slice(&bytes)?;
                let public_key = load_public_key(&dir, meta.current_version)?;
                CurrentKey {
                    version: meta.current_version,
                    public_key: Arc::new(public_key),
                    rotated_at: meta.rotated_at,
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match scan_versions(&dir)?.into_iter().next_back() {
                    Some(version) => {
                        warn!(key_version = %version, "Key metadata missing; adopting newest key on disk");
                        let public_key = load_public_key(&dir, version)?;
                        let rotated_at = Utc::now();
                        write_metadata(&dir, version, rotated_at)?;
                        CurrentKey {
                            version,
                            public_key: Arc::new(public_key),
                            rotated_at,
                        }
                    }
                    None => {
                        let version = KeyVersion::new(1);
                        let public_key = mint_key_pair(&dir, version, bits)?;
                        let rotated_at = Utc::now();
                        write_metadata(&dir, version, rotated_at)?;
                        info!(key_version = %version, "Minted initial key pair");
                        CurrentKey {
                            version,
                            public_key: Arc::new(public_key),
                            rotated_at,
                        }
                    }
                }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir,
            bits,
            current: RwLock::new(current),
            leases: Arc::new(Mutex::new(BTreeMap::new())),
            rotation: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_version(&self) -> KeyVersion {
        self.current.read().unwrap_or_else(|e| e.into_inner()).version
    }

    /// Snapshot the current version and register it as in flight.
    pub fn lease_current(&self) -> KeyLease {
        // The lease is registered while the read guard is held so a rotation
        // cannot slip in between the snapshot and the registration.
        let current = self.current.read().unwrap_or_else(|e| e.into_inner());
        let mut leases = self.leases.lock().unwrap_or_else(|e| e.into_inner());
        *leases.entry(current.version).or_insert(0) += 1;

        KeyLease {
            version: current.version,
            public_key: Arc::clone(&current.public_key),
            leases: Arc::clone(&self.leases),
        }
    }

    /// Mint a new key pair and make it current. The previous current version
    /// becomes retiring.
    ///
    /// CPU bound (RSA key generation); call from a blocking context.
    pub fn rotate(&self) -> KeyRingResult<KeyVersion> {
        let _guard = self.rotation.lock().unwrap_or_else(|e| e.into_inner());
        self.rotate_locked()
    }

    /// Rotate only if the current version is at least `max_age` old.
    /// A zero `max_age` rotates on every call.
    pub fn rotate_if_due(&self, max_age: Duration) -> KeyRingResult<Option<KeyVersion>> {
        let _guard = self.rotation.lock().unwrap_or_else(|e| e.into_inner());
        if !max_age.is_zero() {
            let rotated_at = self.current.read().unwrap_or_else(|e| e.into_inner()).rotated_at;
            let age = Utc::now()
                .signed_duration_since(rotated_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age < max_age {
                return Ok(None);
            }
        }
        self.rotate_locked().map(Some)
    }

    fn rotate_locked(&self) -> KeyRingResult<KeyVersion> {
        let previous = self.current_version();
        let next = previous.next();

        // Key files land before the metadata pointer moves.
        let public_key = mint_key_pair(&self.dir, next, self.bits)?;
        let rotated_at = Utc::now();
        write_metadata(&self.dir, next, rotated_at)?;

        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = CurrentKey {
            version: next,
            public_key: Arc::new(public_key),
            rotated_at,
        };

        info!(key_version = %next, retiring = %previous, "Key pair rotated");
        Ok(next)
    }

    /// Load the private key for `version`.
    pub fn resolve_private_key(&self, version: KeyVersion) -> KeyRingResult<RsaPrivateKey> {
        let path = private_key_path(&self.dir, version);
        let pem = match fs::read_to_string(&path) {
            Ok(pem) => zeroize::Zeroizing::new(pem),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(KeyRingError::NotFound(version))
            }
            Err(e) => return Err(e.into()),
        };
        RsaPrivateKey::from_pkcs8_pem(&pem).map_err(|e| KeyRingError::Encoding(e.to_string()))
    }

    /// Versions with a private key file on disk, ascending.
    pub fn versions_on_disk(&self) -> KeyRingResult<BTreeSet<KeyVersion>> {
        scan_versions(&self.dir)
    }

    pub fn key_state(&self, version: KeyVersion) -> KeyState {
        if version == self.current_version() {
            KeyState::Current
        } else if private_key_path(&self.dir, version).exists() {
            KeyState::Retiring
        } else {
            KeyState::Deleted
        }
    }

    fn leased_versions(&self) -> BTreeSet<KeyVersion> {
        self.leases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Delete every version that is not protected.
    ///
    /// Protected: the current version, leased versions, and versions used by
    /// Pending shares. When any share is Pending the version before current
    /// is kept as well. With no Pending shares everything but current goes.
    ///
    /// Idempotent. A lookup failure aborts before anything is deleted.
    pub fn garbage_collect(&self, usage: &dyn KeyUsage) -> KeyRingResult<Vec<KeyVersion>> {
        let _guard = self.rotation.lock().unwrap_or_else(|e| e.into_inner());

        // Snapshot current + leases before listing pending shares: an upload
        // that persists its share after the listing is still leased here.
        let current = self.current_version();
        let mut protected = self.leased_versions();
        protected.insert(current);

        let pending = usage.pending_key_versions()?;
        if !pending.is_empty() {
            if let Some(previous) = current.previous() {
                protected.insert(previous);
            }
        }
        protected.extend(pending.iter().copied());

        let mut deleted = Vec::new();
        for version in scan_versions(&self.dir)? {
            if protected.contains(&version) {
                continue;
            }
            remove_if_present(&private_key_path(&self.dir, version))?;
            remove_if_present(&public_key_path(&self.dir, version))?;
            deleted.push(version);
        }

        if deleted.is_empty() {
            debug!(current = %current, pending = pending.len(), "Key GC: nothing to delete");
        } else {
            info!(
                current = %current,
                pending = pending.len(),
                deleted = ?deleted.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Key GC: deleted retired key versions"
            );
        }
        Ok(deleted)
    }
}

fn private_key_path(dir: &Path, version: KeyVersion) -> PathBuf {
    dir.join(format!("private_{version}.pem"))
}

fn public_key_path(dir: &Path, version: KeyVersion) -> PathBuf {
    dir.join(format!("public_{version}.pem"))
}

fn parse_private_file_name(name: &str) -> Option<KeyVersion> {
    name.strip_prefix("private_v")?
        .strip_suffix(".pem")?
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .map(KeyVersion::new)
}

fn scan_versions(dir: &Path) -> KeyRingResult<BTreeSet<KeyVersion>> {
    let mut versions = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(version) = entry.file_name().to_str().and_then(parse_private_file_name) {
            versions.insert(version);
        }
    }
    Ok(versions)
}

fn load_public_key(dir: &Path, version: KeyVersion) -> KeyRingResult<RsaPublicKey> {
    let pem = match fs::read_to_string(public_key_path(dir, version)) {
        Ok(pem) => pem,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(KeyRingError::NotFound(version))
        }
        Err(e) => return Err(e.into()),
    };
    RsaPublicKey::from_public_key_pem(&pem).map_err(|e| KeyRingError::Encoding(e.to_string()))
}

fn mint_key_pair(dir: &Path, version: KeyVersion, bits: usize) -> KeyRingResult<RsaPublicKey> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| KeyRingError::Generation(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| KeyRingError::Encoding(e.to_string()))?;
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| KeyRingError::Encoding(e.to_string()))?;

    write_atomic(&private_key_path(dir, version), private_pem.as_bytes(), true)?;
    write_atomic(&public_key_path(dir, version), public_pem.as_bytes(), false)?;
    Ok(public_key)
}

fn write_metadata(dir: &Path, version: KeyVersion, rotated_at: DateTime<Utc>) -> KeyRingResult<()> {
    let meta = VersionMetadata {
        current_version: version,
        rotated_at,
    };
    let json = serde_json::to_vec_pretty(&meta)?;
    write_atomic(&dir.join(METADATA_FILE), &json, false)?;
    Ok(())
}

/// Write via a temp file and rename so readers never observe a partial file.
///
/// Private files are created owner-only; the mode applies from creation.
fn write_atomic(path: &Path, contents: &[u8], private: bool) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    // A leftover temp file would keep its old mode.
    remove_if_present(&temp_path)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_BITS: usize = 1024;

    struct Pending(BTreeSet<KeyVersion>);

    impl KeyUsage for Pending {
        fn pending_key_versions(&self) -> Result<BTreeSet<KeyVersion>, StorageError> {
            Ok(self.0.clone())
        }
    }

    struct Unavailable;

    impl KeyUsage for Unavailable {
        fn pending_key_versions(&self) -> Result<BTreeSet<KeyVersion>, StorageError> {
            Err(StorageError::Unavailable("share store offline".to_string()))
        }
    }

    fn none() -> Pending {
        Pending(BTreeSet::new())
    }

    #[cfg(unix)]
    #[test]
    fn private_key_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
        let v2 = ring.rotate().unwrap();

        for version in [KeyVersion::new(1), v2] {
            let mode = fs::metadata(private_key_path(temp.path(), version))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600, "{version}");
        }
        assert!(!temp.path().join(format!("private_{v2}.tmp")).exists());
    }

    #[test]
    fn write_atomic_replaces_stale_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("private_v9.pem");
        fs::write(path.with_extension("tmp"), b"stale").unwrap();

        write_atomic(&path, b"fresh", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"fresh");
        assert!(!path.with_extension("tmp").exists());
    }

    fn pending(versions: &[u32]) -> Pending {
        Pending(versions.iter().copied().map(KeyVersion::new).collect())
    }

    fn ring_with_versions(count: u32) -> (KeyRing, TempDir) {
        let temp = TempDir::new().unwrap();
        let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
        for _ in 1..count {
            ring.rotate().unwrap();
        }
        (ring, temp)
    }

    fn versions(list: &[u32]) -> BTreeSet<KeyVersion> {
        list.iter().copied().map(KeyVersion::new).collect()
    }

    #[test]
    fn open_mints_first_version() {
        let temp = TempDir::new().unwrap();
        let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
        assert_eq!(ring.current_version(), KeyVersion::new(1));
        assert!(temp.path().join("private_v1.pem").exists());
        assert!(temp.path().join("public_v1.pem").exists());
        assert!(temp.path().join(METADATA_FILE).exists());
    }

    #[test]
    fn reopen_preserves_current_version() {
        let temp = TempDir::new().unwrap();
        {
            let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
            ring.rotate().unwrap();
            ring.rotate().unwrap();
        }
        let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
        assert_eq!(ring.current_version(), KeyVersion::new(3));
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[1, 2, 3]));
    }

    #[test]
    fn open_adopts_newest_key_when_metadata_missing() {
        let temp = TempDir::new().unwrap();
        {
            let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
            ring.rotate().unwrap();
        }
        fs::remove_file(temp.path().join(METADATA_FILE)).unwrap();
        let ring = KeyRing::open(temp.path(), TEST_BITS).unwrap();
        assert_eq!(ring.current_version(), KeyVersion::new(2));
    }

    #[test]
    fn rotate_increments_and_retires_previous() {
        let (ring, _temp) = ring_with_versions(1);
        let next = ring.rotate().unwrap();
        assert_eq!(next, KeyVersion::new(2));
        assert_eq!(ring.key_state(KeyVersion::new(2)), KeyState::Current);
        assert_eq!(ring.key_state(KeyVersion::new(1)), KeyState::Retiring);
        assert_eq!(ring.key_state(KeyVersion::new(9)), KeyState::Deleted);
    }

    #[test]
    fn lease_snapshot_survives_rotation() {
        let (ring, _temp) = ring_with_versions(1);
        let lease = ring.lease_current();
        ring.rotate().unwrap();

        assert_eq!(lease.version(), KeyVersion::new(1));
        let key = crate::crypto::generate_symmetric_key();
        let wrapped = crate::crypto::wrap_key(&key, lease.public_key()).unwrap();
        let private = ring.resolve_private_key(lease.version()).unwrap();
        let unwrapped = crate::crypto::unwrap_key(&wrapped, &private).unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn gc_without_pending_keeps_only_current() {
        let (ring, _temp) = ring_with_versions(4);
        let deleted = ring.garbage_collect(&none()).unwrap();
        assert_eq!(deleted, vec![KeyVersion::new(1), KeyVersion::new(2), KeyVersion::new(3)]);
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[4]));
        assert_eq!(ring.key_state(KeyVersion::new(2)), KeyState::Deleted);
    }

    #[test]
    fn gc_with_pending_keeps_referenced_and_two_most_recent() {
        let (ring, _temp) = ring_with_versions(5);
        ring.garbage_collect(&pending(&[1])).unwrap();
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[1, 4, 5]));

        for v in [1, 4, 5] {
            assert!(ring.resolve_private_key(KeyVersion::new(v)).is_ok());
        }
    }

    #[test]
    fn gc_protects_leased_version() {
        let (ring, _temp) = ring_with_versions(1);
        let lease = ring.lease_current();
        ring.rotate().unwrap();
        ring.rotate().unwrap();

        ring.garbage_collect(&none()).unwrap();
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[1, 3]));

        drop(lease);
        ring.garbage_collect(&none()).unwrap();
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[3]));
    }

    #[test]
    fn gc_is_idempotent() {
        let (ring, _temp) = ring_with_versions(3);
        assert_eq!(ring.garbage_collect(&none()).unwrap().len(), 2);
        assert!(ring.garbage_collect(&none()).unwrap().is_empty());
    }

    #[test]
    fn gc_tolerates_half_deleted_version() {
        let (ring, temp) = ring_with_versions(2);
        fs::remove_file(temp.path().join("public_v1.pem")).unwrap();
        assert_eq!(ring.garbage_collect(&none()).unwrap(), vec![KeyVersion::new(1)]);
        assert!(!temp.path().join("private_v1.pem").exists());
    }

    #[test]
    fn gc_aborts_when_pending_lookup_fails() {
        let (ring, _temp) = ring_with_versions(3);
        let err = ring.garbage_collect(&Unavailable).unwrap_err();
        assert!(matches!(err, KeyRingError::Storage(_)));
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[1, 2, 3]));
    }

    #[test]
    fn concurrent_gc_runs_are_safe() {
        let (ring, _temp) = ring_with_versions(4);
        let ring = Arc::new(ring);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                std::thread::spawn(move || ring.garbage_collect(&pending(&[2])).unwrap())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap().len()).sum();
        assert_eq!(total, 1);
        assert_eq!(ring.versions_on_disk().unwrap(), versions(&[2, 3, 4]));
    }

    #[test]
    fn resolve_missing_version_is_not_found() {
        let (ring, _temp) = ring_with_versions(1);
        assert!(matches!(
            ring.resolve_private_key(KeyVersion::new(7)),
            Err(KeyRingError::NotFound(v)) if v == KeyVersion::new(7)
        ));
    }

    #[test]
    fn rotate_if_due_respects_interval() {
        let (ring, _temp) = ring_with_versions(1);
        assert_eq!(ring.rotate_if_due(Duration::from_secs(3600)).unwrap(), None);
        assert_eq!(
            ring.rotate_if_due(Duration::ZERO).unwrap(),
            Some(KeyVersion::new(2))
        );
    }

    #[test]
    fn version_display_and_file_names() {
        assert_eq!(KeyVersion::new(12).to_string(), "v12");
        assert_eq!(parse_private_file_name("private_v12.pem"), Some(KeyVersion::new(12)));
        assert_eq!(parse_private_file_name("public_v12.pem"), None);
        assert_eq!(parse_private_file_name("private_v0.pem"), None);
        assert_eq!(parse_private_file_name("private_v3.tmp"), None);
        assert_eq!(KeyVersion::new(1).previous(), None);
        assert_eq!(KeyVersion::new(3).previous(), Some(KeyVersion::new(2)));
    }
}

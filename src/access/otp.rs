// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ephemeral one-time codes.
//!
//! Records live only in process memory (bounded LRU). Neither the token nor
//! the code is stored: the map key is a SHA-256 digest of the token, the
//! value an HMAC digest of the code checked in constant time.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use lru::LruCache;
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

struct OtpRecord {
    digest: [u8; 32],
    expires_at: Instant,
}

/// Result of presenting a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    /// No record for this token (never issued, consumed, or evicted).
    Missing,
    Expired,
    Mismatch,
}

/// In-memory OTP records keyed by access token.
pub struct OtpStore {
    records: Mutex<LruCache<String, OtpRecord>>,
    ttl: Duration,
    keyed_mac: HmacSha256,
}

impl OtpStore {
    /// - `secret`: HMAC key for code digests.
    /// - `capacity`: max number of outstanding records; the least recently
    ///   used record is evicted beyond that.
    /// - `ttl`: lifetime of each record.
    pub fn new(secret: &[u8], capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        // HMAC accepts keys of any length, so the fallback is unreachable.
        let keyed_mac = <HmacSha256 as Mac>::new_from_slice(secret)
            .unwrap_or_else(|_| <HmacSha256 as Mac>::new(&Default::default()));
        Self {
            records: Mutex::new(LruCache::new(capacity)),
            ttl,
            keyed_mac,
        }
    }

    /// A uniform random six-digit code.
    pub fn generate() -> String {
        OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, OtpRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_key(token: &str) -> String {
        Base64UrlUnpadded::encode_string(&Sha256::digest(token.as_bytes()))
    }

    fn code_mac(&self, key: &str, code: &str) -> HmacSha256 {
        let mut mac = self.keyed_mac.clone();
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(code.as_bytes());
        mac
    }

    /// Store `code` for `token`, replacing any previous record.
    pub fn insert(&self, token: &str, code: &str) {
        let key = Self::record_key(token);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.code_mac(&key, code).finalize().into_bytes());
        let record = OtpRecord {
            digest,
            expires_at: Instant::now() + self.ttl,
        };

        if let Some((evicted, _)) = self.lock().push(key.clone(), record) {
            if evicted != key {
                warn!("OTP store at capacity; evicted least recently used record");
            }
        }
    }

    /// Check `code`; a valid code is removed in the same critical section,
    /// so it can succeed at most once.
    pub fn check_and_consume(&self, token: &str, code: &str) -> OtpCheck {
        let key = Self::record_key(token);
        let mut records = self.lock();
        let Some(record) = records.peek(&key) else {
            return OtpCheck::Missing;
        };
        if Instant::now() >= record.expires_at {
            return OtpCheck::Expired;
        }
        if self.code_mac(&key, code).verify_slice(&record.digest).is_err() {
            return OtpCheck::Mismatch;
        }
        records.pop(&key);
        OtpCheck::Valid
    }

    /// Drop expired records. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.lock();
        let stale: Vec<String> = records
            .iter()
            .filter(|(_, record)| now >= record.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            records.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> OtpStore {
        OtpStore::new(b"otp-secret", 100, ttl)
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = OtpStore::generate();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&value));
        }
    }

    #[test]
    fn valid_code_is_consumed_once() {
        let otps = store(Duration::from_secs(300));
        otps.insert("token-a", "123456");

        assert_eq!(otps.check_and_consume("token-a", "123456"), OtpCheck::Valid);
        assert_eq!(otps.check_and_consume("token-a", "123456"), OtpCheck::Missing);
    }

    #[test]
    fn mismatch_keeps_record_for_retry() {
        let otps = store(Duration::from_secs(300));
        otps.insert("token-a", "123456");

        assert_eq!(otps.check_and_consume("token-a", "654321"), OtpCheck::Mismatch);
        assert_eq!(otps.check_and_consume("token-a", "12345"), OtpCheck::Mismatch);
        assert_eq!(otps.check_and_consume("token-a", " 123456"), OtpCheck::Mismatch);
        assert_eq!(otps.check_and_consume("token-a", "123456"), OtpCheck::Valid);
    }

    #[test]
    fn codes_are_bound_to_their_token() {
        let otps = store(Duration::from_secs(300));
        otps.insert("token-a", "111111");
        otps.insert("token-b", "222222");

        assert_eq!(otps.check_and_consume("token-a", "222222"), OtpCheck::Mismatch);
        assert_eq!(otps.check_and_consume("token-c", "111111"), OtpCheck::Missing);
        assert_eq!(otps.len(), 2);
        assert_eq!(otps.check_and_consume("token-b", "222222"), OtpCheck::Valid);
        assert_eq!(otps.len(), 1);
    }

    #[test]
    fn expired_code_reports_expired_and_is_purged() {
        let otps = store(Duration::from_millis(1));
        otps.insert("token-a", "123456");
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(otps.check_and_consume("token-a", "123456"), OtpCheck::Expired);
        assert_eq!(otps.purge_expired(), 1);
        assert!(otps.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let otps = OtpStore::new(b"otp-secret", 2, Duration::from_secs(300));
        otps.insert("t1", "111111");
        otps.insert("t2", "222222");
        otps.insert("t3", "333333");

        assert_eq!(otps.len(), 2);
        assert_eq!(otps.check_and_consume("t1", "111111"), OtpCheck::Missing);
        assert_eq!(otps.check_and_consume("t3", "333333"), OtpCheck::Valid);
    }
}

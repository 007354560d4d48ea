// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Crypto Engine
//!
//! Per-file symmetric encryption (AES-256-CBC, encrypt-then-MAC with
//! HMAC-SHA256) and asymmetric wrapping of the per-file key under a
//! versioned RSA key pair (RSA-OAEP, SHA-256).
//!
//! Everything here is a pure transformation: no I/O, no shared state.
//! Randomness only enters through [`generate_symmetric_key`] and
//! [`generate_iv`], so `encrypt` is deterministic for identical inputs.

pub mod envelope;

pub use envelope::{
    decrypt, encrypt, generate_iv, generate_symmetric_key, open, unwrap_key, wrap_key, Envelope,
    Iv, SymmetricKey, IV_LEN, KEY_LEN, TAG_LEN,
};

/// Errors raised by the crypto engine.
///
/// These are always fatal to the single operation that produced them and are
/// never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("ciphertext is truncated")]
    Truncated,

    #[error("ciphertext failed integrity check")]
    Integrity,

    #[error("invalid padding")]
    Padding,

    #[error("key wrap failed: {0}")]
    Wrap(String),

    #[error("key unwrap failed")]
    Unwrap,

    #[error("encoding error: {0}")]
    Encoding(String),
}

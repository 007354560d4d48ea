// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric encryption and key wrapping primitives.
//!
//! ## Ciphertext layout
//!
//! ```text
//! AES-256-CBC(PKCS#7) ciphertext || HMAC-SHA256(mac_key, iv || ciphertext)
//! ```
//!
//! `mac_key` is derived from the per-file key, so the file key is the only
//! secret that needs wrapping.

use aes::Aes256;
use base64ct::{Base64, Encoding};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::CryptoError;
use crate::keyring::KeyVersion;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Symmetric key size (AES-256).
pub const KEY_LEN: usize = 32;
/// CBC initialization vector size.
pub const IV_LEN: usize = 16;
/// Integrity tag appended to every ciphertext.
pub const TAG_LEN: usize = 32;

const BLOCK_LEN: usize = 16;
const MAC_KEY_LABEL: &[u8] = b"secure-share/envelope-mac/v1";

/// A per-file 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "key",
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// A 128-bit CBC initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let iv: [u8; IV_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "iv",
            expected: IV_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(iv))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes =
            Base64::decode_vec(encoded).map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_base64(&self) -> String {
        Base64::encode_string(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// Cryptographically random 256-bit key.
pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let out = SymmetricKey(key);
    key.zeroize();
    out
}

/// Cryptographically random IV. Callers generate one per envelope.
pub fn generate_iv() -> Iv {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    Iv(iv)
}

fn mac_for(key: &SymmetricKey, iv: &Iv, ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut derive = <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).map_err(|_| {
        CryptoError::InvalidLength {
            what: "key",
            expected: KEY_LEN,
            actual: key.as_bytes().len(),
        }
    })?;
    derive.update(MAC_KEY_LABEL);
    let mut mac_key = Zeroizing::new([0u8; KEY_LEN]);
    mac_key.copy_from_slice(&derive.finalize().into_bytes());

    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key.as_slice()).map_err(|_| {
        CryptoError::InvalidLength {
            what: "mac key",
            expected: KEY_LEN,
            actual: mac_key.len(),
        }
    })?;
    mac.update(iv.as_bytes());
    mac.update(ciphertext);
    Ok(mac)
}

/// Encrypt `plaintext` under `key` and `iv`.
///
/// Deterministic: the same `(plaintext, key, iv)` always yields the same bytes.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes()).map_err(|_| {
        CryptoError::InvalidLength {
            what: "key",
            expected: KEY_LEN,
            actual: key.as_bytes().len(),
        }
    })?;
    let mut out = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let tag = mac_for(key, iv, &out)?.finalize().into_bytes();
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Inverse of [`encrypt`].
///
/// The integrity tag is checked in constant time before any unpadding, so a
/// wrong key or corrupted input fails with [`CryptoError::Integrity`].
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < BLOCK_LEN + TAG_LEN || (ciphertext.len() - TAG_LEN) % BLOCK_LEN != 0 {
        return Err(CryptoError::Truncated);
    }
    let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);

    mac_for(key, iv, body)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::Integrity)?;

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes()).map_err(|_| {
        CryptoError::InvalidLength {
            what: "key",
            expected: KEY_LEN,
            actual: key.as_bytes().len(),
        }
    })?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| CryptoError::Padding)
}

/// Wrap a symmetric key under an RSA public key (OAEP, SHA-256).
pub fn wrap_key(key: &SymmetricKey, public_key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap(e.to_string()))
}

/// Unwrap a key produced by [`wrap_key`].
///
/// Fails with [`CryptoError::Unwrap`] when the private key does not belong to
/// the wrapping public key.
pub fn unwrap_key(wrapped: &[u8], private_key: &RsaPrivateKey) -> Result<SymmetricKey, CryptoError> {
    let raw = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::Unwrap)?,
    );
    SymmetricKey::from_slice(&raw)
}

/// The encrypted representation of one file.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub ciphertext: Vec<u8>,
    pub iv: Iv,
    pub wrapped_key: Vec<u8>,
    pub key_version: KeyVersion,
}

impl Envelope {
    /// Generate a fresh key and IV, encrypt `plaintext`, and wrap the key
    /// under `public_key` (recorded as `key_version`).
    pub fn seal(
        plaintext: &[u8],
        key_version: KeyVersion,
        public_key: &RsaPublicKey,
    ) -> Result<Self, CryptoError> {
        let key = generate_symmetric_key();
        let iv = generate_iv();
        let ciphertext = encrypt(plaintext, &key, &iv)?;
        let wrapped_key = wrap_key(&key, public_key)?;
        Ok(Self {
            ciphertext,
            iv,
            wrapped_key,
            key_version,
        })
    }

    pub fn wrapped_key_base64(&self) -> String {
        Base64::encode_string(&self.wrapped_key)
    }
}

/// Unwrap the file key and decrypt a stored ciphertext.
pub fn open(
    ciphertext: &[u8],
    wrapped_key: &[u8],
    iv: &Iv,
    private_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let key = unwrap_key(wrapped_key, private_key)?;
    decrypt(ciphertext, &key, iv)
}

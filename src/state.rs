// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use jsonwebtoken::DecodingKey;

use crate::transfer::TransferService;

/// Default request body limit for uploads (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Verification material for sender session tokens.
pub struct AuthConfig {
    decoding_key: DecodingKey,
}

impl AuthConfig {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

#[derive(Clone)]
pub struct AppState {
    pub transfer: Arc<TransferService>,
    pub auth: Arc<AuthConfig>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(transfer: Arc<TransferService>, auth: AuthConfig) -> Self {
        Self {
            transfer,
            auth: Arc::new(auth),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secure Share - one-time encrypted file transfer service
//!
//! A sender uploads a file for one recipient. The file is scanned, sealed
//! with a fresh AES key wrapped under the current RSA key version, and made
//! retrievable exactly once by whoever holds both the access token (primary
//! channel) and the one-time code (secondary channel).
//!
//! ## Modules
//!
//! - `access` - Access tokens, one-time codes and the redeem protocol
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Sender session authentication (HS256 JWT)
//! - `crypto` - Envelope encryption (AES-256-CBC + HMAC, RSA-OAEP)
//! - `keyring` - Versioned RSA key ring with rotation and garbage collection
//! - `shares` - Share records and their lifecycle state machine
//! - `storage` - Ciphertext store, share database and audit log
//! - `transfer` - Upload / redeem / revoke orchestration and expiry sweeping

pub mod access;
pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod keyring;
pub mod models;
pub mod scanner;
pub mod shares;
pub mod state;
pub mod storage;
pub mod transfer;

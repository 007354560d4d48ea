// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Token / OTP Protocol
//!
//! A recipient needs two independent secrets, delivered over two channels:
//!
//! - an **access token**: HS256-signed capability naming the share and the
//!   envelope parameters needed to decrypt it (primary channel);
//! - a **one-time code**: six digits held in process memory, keyed by the
//!   token (secondary channel).
//!
//! Validation reports share *state* (downloaded / revoked / expired) before
//! it looks at the code at all.

pub mod otp;
pub mod protocol;
pub mod token;

pub use otp::{OtpCheck, OtpStore};
pub use protocol::{AccessError, AccessProtocol, DenialReason, IssuedAccess, ValidatedAccess};
pub use token::{CapabilityClaims, CapabilitySigner, TokenError};

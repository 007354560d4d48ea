// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Sender authentication for the management endpoints.
//!
//! ## Auth Flow
//!
//! 1. The sender's front end obtains a session JWT from the identity service
//! 2. It sends `Authorization: Bearer <session JWT>`
//! 3. The server:
//!    - Verifies the HS256 signature with `AUTH_JWT_SECRET`
//!    - Checks `exp` (and `nbf` when present)
//!    - Extracts `sub` → canonical sender id, `email` → optional contact
//!
//! ## Security
//!
//! - Uploads and share management require a session
//! - Health checks and downloads do not; a download is authorized by the
//!   access token and one-time code alone
//! - Clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::{AuthenticatedUser, SessionClaims};
pub use error::AuthError;
pub use extractor::Auth;

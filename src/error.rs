// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::access::DenialReason;
use crate::transfer::TransferError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }

    /// A refused download.
    pub fn denied(reason: DenialReason) -> Self {
        let status = match reason {
            DenialReason::TokenInvalid => StatusCode::UNAUTHORIZED,
            DenialReason::AlreadyDownloaded | DenialReason::Revoked | DenialReason::Expired => {
                StatusCode::GONE
            }
            DenialReason::NotAvailable => StatusCode::NOT_FOUND,
            DenialReason::OtpInvalid | DenialReason::OtpExpired | DenialReason::OtpMismatch => {
                StatusCode::FORBIDDEN
            }
        };
        Self::new(status, reason.code(), reason.message())
    }
}

impl From<TransferError> for ApiError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Denied(reason) => ApiError::denied(reason),
            TransferError::VirusDetected(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VIRUS_DETECTED",
                "The file was rejected by the malware scan",
            ),
            TransferError::Validation(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
            }
            TransferError::ScanUnavailable(detail) => {
                error!(error = %detail, "Malware scanner unavailable");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SCAN_UNAVAILABLE",
                    "The malware scanner is unavailable; try again later",
                )
            }
            TransferError::Storage(e) => {
                error!(error = %e, "Storage failure");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "Storage is temporarily unavailable",
                )
            }
            // Other senders' shares are indistinguishable from missing ones.
            TransferError::NotFound | TransferError::NotOwner => {
                ApiError::not_found("Share not found")
            }
            TransferError::InvalidState(status) => ApiError::new(
                StatusCode::CONFLICT,
                "INVALID_STATE",
                format!("Share is already {status}"),
            ),
            TransferError::Crypto(e) => {
                error!(error = %e, "Cryptographic failure");
                ApiError::internal()
            }
            TransferError::KeyRing(e) => {
                error!(error = %e, "Key ring failure");
                ApiError::internal()
            }
            TransferError::Internal(detail) => {
                error!(error = %detail, "Internal failure");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: &self.message,
            code: self.code,
        });
        (self.status, body).into_response()
    }
}

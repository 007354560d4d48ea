// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual readiness check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Content store accepts writes.
    pub content_store: String,
    /// Private key of the current version loads from disk.
    pub key_ring: String,
    /// Share metadata store answers queries.
    pub share_store: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn label(ok: bool) -> String {
    if ok { "ok" } else { "unavailable" }.to_string()
}

async fn check_content_store(state: &AppState) -> bool {
    match state.transfer.content().health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Readiness: content store check failed");
            false
        }
    }
}

async fn check_key_ring(state: &AppState) -> bool {
    let keyring = std::sync::Arc::clone(state.transfer.keyring());
    let result = tokio::task::spawn_blocking(move || {
        keyring.resolve_private_key(keyring.current_version())
    })
    .await;
    match result {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Readiness: key ring check failed");
            false
        }
        Err(e) => {
            warn!(error = %e, "Readiness: key ring check panicked");
            false
        }
    }
}

fn check_share_store(state: &AppState) -> bool {
    match state.transfer.lifecycle().store().health_check() {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Readiness: share store check failed");
            false
        }
    }
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if the content store, key ring and share store are all
/// usable; 503 otherwise.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let content_ok = check_content_store(&state).await;
    let keys_ok = check_key_ring(&state).await;
    let shares_ok = check_share_store(&state);
    let all_ok = content_ok && keys_ok && shares_ok;

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            content_store: label(content_ok),
            key_ring: label(keys_ok),
            share_store: label(shares_ok),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_app;

    #[tokio::test]
    async fn liveness_is_ok() {
        let Json(body) = liveness().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn readiness_ok_when_all_components_are() {
        let app = test_app();
        let (status, Json(body)) = readiness(State(app.state.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.key_ring, "ok");
    }

    #[tokio::test]
    async fn readiness_degraded_when_content_store_is_down() {
        let app = test_app();
        app.content.set_unavailable(true);
        let (status, Json(body)) = readiness(State(app.state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.content_store, "unavailable");
        assert_eq!(body.checks.share_store, "ok");
    }

    #[tokio::test]
    async fn readiness_degraded_when_current_private_key_is_missing() {
        let app = test_app();
        let keyring = app.state.transfer.keyring();
        let path = keyring
            .dir()
            .join(format!("private_{}.pem", keyring.current_version()));
        std::fs::remove_file(path).unwrap();

        let (status, Json(body)) = readiness(State(app.state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.checks.key_ring, "unavailable");
        assert_eq!(body.checks.content_store, "ok");
    }

    #[tokio::test]
    async fn readiness_degraded_when_current_private_key_is_corrupt() {
        let app = test_app();
        let keyring = app.state.transfer.keyring();
        let path = keyring
            .dir()
            .join(format!("private_{}.pem", keyring.current_version()));
        std::fs::write(path, "not a pem").unwrap();

        let (status, Json(body)) = readiness(State(app.state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.checks.key_ring, "unavailable");
    }

    #[tokio::test]
    async fn readiness_degraded_when_share_store_is_down() {
        let app = test_app();
        app.shares.set_unavailable(true);
        let (status, Json(body)) = readiness(State(app.state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.checks.share_store, "unavailable");
    }
}

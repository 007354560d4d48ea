// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::AuthenticatedUser,
    models::{DownloadRequest, RevokeResponse, ShareListResponse, ShareView, UploadResponse},
    shares::ShareStatus,
    state::AppState,
};

pub mod downloads;
pub mod health;
pub mod shares;
pub mod uploads;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    let v1_routes = Router::new()
        .route("/uploads", post(uploads::create_upload).layer(upload_limit))
        .route("/shares", get(shares::list_shares))
        .route("/shares/{storage_token}", get(shares::get_share))
        .route("/shares/{storage_token}/revoke", post(shares::revoke_share))
        .route("/downloads", post(downloads::download));

    let x_request_id = http::HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::liveness))
        .route("/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");

                // Download bodies carry secrets; the URI never does.
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri().path(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        uploads::create_upload,
        shares::list_shares,
        shares::get_share,
        shares::revoke_share,
        downloads::download
    ),
    components(
        schemas(
            AuthenticatedUser,
            DownloadRequest,
            RevokeResponse,
            ShareListResponse,
            ShareStatus,
            ShareView,
            UploadResponse,
            uploads::UploadForm,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Uploads", description = "Encrypted one-time file uploads"),
        (name = "Shares", description = "Sender view and revocation of shares"),
        (name = "Downloads", description = "Token and one-time code gated downloads")
    )
)]
pub struct ApiDoc;

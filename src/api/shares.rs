// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::{
    auth::Auth,
    error::ApiError,
    models::{RevokeResponse, ShareListResponse, ShareView},
    state::AppState,
};

#[utoipa::path(
    get,
    path = "/v1/shares",
    tag = "Shares",
    responses(
        (status = 200, body = ShareListResponse),
        (status = 401, description = "Missing or invalid session")
    )
)]
pub async fn list_shares(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<ShareListResponse>, ApiError> {
    let shares = state.transfer.list_shares(&user.user_id)?;
    Ok(Json(ShareListResponse {
        shares: shares.iter().map(ShareView::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/shares/{storage_token}",
    params(
        ("storage_token" = String, Path, description = "Share identifier")
    ),
    tag = "Shares",
    responses(
        (status = 200, body = ShareView),
        (status = 404, description = "No such share for this sender")
    )
)]
pub async fn get_share(
    Auth(user): Auth,
    Path(storage_token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ShareView>, ApiError> {
    let share = state.transfer.share_status(&storage_token, &user.user_id)?;
    Ok(Json(ShareView::from(&share)))
}

#[utoipa::path(
    post,
    path = "/v1/shares/{storage_token}/revoke",
    params(
        ("storage_token" = String, Path, description = "Share identifier")
    ),
    tag = "Shares",
    responses(
        (status = 200, body = RevokeResponse),
        (status = 404, description = "No such share for this sender"),
        (status = 409, description = "Share already left Pending")
    )
)]
pub async fn revoke_share(
    Auth(user): Auth,
    Path(storage_token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let share = state.transfer.revoke(&storage_token, &user.user_id).await?;
    info!(sender = %user.user_id, storage_token = %share.storage_token, "Share revoked");
    Ok(Json(RevokeResponse {
        share: ShareView::from(&share),
    }))
}

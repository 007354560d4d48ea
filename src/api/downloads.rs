// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::{error::ApiError, models::DownloadRequest, state::AppState};

/// MIME type derived from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987
/// `filename*` for the exact name.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(file_name.len() * 3);
    for byte in file_name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[utoipa::path(
    post,
    path = "/v1/downloads",
    request_body = DownloadRequest,
    tag = "Downloads",
    responses(
        (status = 200, description = "Decrypted file bytes"),
        (status = 401, description = "Access token is invalid"),
        (status = 403, description = "One-time code missing, expired or wrong"),
        (status = 404, description = "File is no longer available"),
        (status = 410, description = "Share was downloaded, revoked or expired")
    )
)]
pub async fn download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> Result<Response, ApiError> {
    let file = state
        .transfer
        .redeem(request.token.trim(), &request.otp)
        .await?;

    info!(file_name = %file.file_name, size_bytes = file.bytes.len(), "File delivered");

    let disposition = HeaderValue::from_str(&content_disposition(&file.file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type_for(&file.file_name))),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        file.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::api::router;
    use crate::api::testing::{download_request, json_body, multipart_body, upload_request};
    use crate::auth::extractor::testing::session_token;
    use crate::state::testing::{test_app, TestApp, AUTH_SECRET};

    async fn upload(app: &TestApp, file_name: &str) {
        let body = multipart_body(
            &[("recipient_email", "bob@example.com"), ("recipient_phone", "+15550100")],
            Some((file_name, &b"payload"[..])),
        );
        let session = session_token(AUTH_SECRET, "alice", None, 600);
        let response = router(app.state.clone())
            .oneshot(upload_request(&session, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("photo.jpg"), "image/jpeg");
        assert_eq!(content_type_for("shot.png"), "image/png");
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("clip.MOV"), "video/quicktime");
        assert_eq!(content_type_for("archive.tar.gz"), "application/octet-stream");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn disposition_escapes_quotes_and_non_ascii() {
        assert_eq!(
            content_disposition("a\"b.txt"),
            "attachment; filename=\"a_b.txt\"; filename*=UTF-8''a%22b.txt"
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }

    #[tokio::test]
    async fn wrong_otp_is_forbidden_then_correct_one_works() {
        let app = test_app();
        upload(&app, "clip.mp4").await;
        let (token, otp) = app.notifier.last_credentials().unwrap();
        let wrong = if otp == "000000" { "111111" } else { "000000" };

        let response = router(app.state.clone())
            .oneshot(download_request(&token, wrong))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "OTP_MISMATCH");

        let response = router(app.state.clone())
            .oneshot(download_request(&token, &otp))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn otp_must_match_exactly() {
        let app = test_app();
        upload(&app, "a.txt").await;
        let (token, otp) = app.notifier.last_credentials().unwrap();

        let response = router(app.state.clone())
            .oneshot(download_request(&token, &format!(" {otp} ")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["code"], "OTP_MISMATCH");

        let response = router(app.state.clone())
            .oneshot(download_request(&token, &otp))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forged_token_is_unauthorized() {
        let app = test_app();
        let response = router(app.state.clone())
            .oneshot(download_request("not.a.token", "123456"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn missing_ciphertext_is_not_found() {
        let app = test_app();
        upload(&app, "a.txt").await;
        let (token, otp) = app.notifier.last_credentials().unwrap();
        app.content.clear();

        let response = router(app.state.clone())
            .oneshot(download_request(&token, &otp))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "NOT_AVAILABLE");
    }
}

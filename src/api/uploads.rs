// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    models::UploadResponse,
    state::AppState,
    transfer::UploadRequest,
};

/// Multipart form accepted by `POST /v1/uploads`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// The file to share.
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// Primary channel: receives the access link.
    recipient_email: String,
    /// Secondary channel: receives the one-time code.
    recipient_phone: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), "INVALID_MULTIPART", err.body_text())
}

#[utoipa::path(
    post,
    path = "/v1/uploads",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    tag = "Uploads",
    responses(
        (status = 201, body = UploadResponse),
        (status = 400, description = "Validation failed or the file is infected"),
        (status = 401, description = "Missing or invalid session"),
        (status = 413, description = "File exceeds the upload limit"),
        (status = 503, description = "Scanner or storage unavailable")
    )
)]
pub async fn create_upload(
    Auth(user): Auth,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut recipient_email = String::new();
    let mut recipient_phone = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, bytes.to_vec()));
            }
            "recipient_email" => {
                recipient_email = field.text().await.map_err(multipart_error)?;
            }
            "recipient_phone" => {
                recipient_phone = field.text().await.map_err(multipart_error)?;
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::bad_request("A `file` part is required"))?;

    let receipt = state
        .transfer
        .initiate_upload(UploadRequest {
            file_name,
            bytes,
            sender_id: user.user_id.clone(),
            sender_email: user.email.clone(),
            recipient_email,
            recipient_phone,
        })
        .await?;

    info!(
        sender = %user.user_id,
        storage_token = %receipt.share.storage_token,
        size_bytes = receipt.share.size_bytes,
        "Upload accepted"
    );

    Ok((StatusCode::CREATED, Json(UploadResponse::from(&receipt))))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::api::router;
    use crate::api::testing::{json_body, multipart_body, upload_request};
    use crate::auth::extractor::testing::session_token;
    use crate::scanner::testing::FixedScanner;
    use crate::scanner::ScanVerdict;
    use crate::state::testing::{test_app, test_app_with_scanner, AUTH_SECRET};

    fn session() -> String {
        session_token(AUTH_SECRET, "alice", None, 600)
    }

    fn recipient_fields() -> [(&'static str, &'static str); 2] {
        [("recipient_email", "bob@example.com"), ("recipient_phone", "+15550100")]
    }

    #[tokio::test]
    async fn upload_requires_session() {
        let app = test_app();
        let body = multipart_body(&recipient_fields(), Some(("a.txt", &b"hello"[..])));
        let mut request = upload_request("ignored", body);
        request.headers_mut().remove("authorization");

        let response = router(app.state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.content.is_empty());
    }

    #[tokio::test]
    async fn upload_without_file_is_bad_request() {
        let app = test_app();
        let body = multipart_body(&recipient_fields(), None);
        let response = router(app.state).oneshot(upload_request(&session(), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_without_phone_is_validation_error() {
        let app = test_app();
        let body = multipart_body(&[("recipient_email", "bob@example.com")], Some(("a.txt", &b"hello"[..])));
        let response = router(app.state).oneshot(upload_request(&session(), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "VALIDATION_FAILED");
        assert!(app.content.is_empty());
    }

    #[tokio::test]
    async fn infected_upload_is_rejected() {
        let app = test_app_with_scanner(Arc::new(FixedScanner(Some(ScanVerdict::infected(vec![
            "Eicar-Test-Signature".to_string(),
        ])))));
        let body = multipart_body(&recipient_fields(), Some(("eicar.com", &b"X5O!P%@AP"[..])));
        let response = router(app.state).oneshot(upload_request(&session(), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "VIRUS_DETECTED");
        assert!(app.content.is_empty());
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn scanner_outage_is_service_unavailable() {
        let app = test_app_with_scanner(Arc::new(FixedScanner(None)));
        let body = multipart_body(&recipient_fields(), Some(("a.txt", &b"hello"[..])));
        let response = router(app.state).oneshot(upload_request(&session(), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = test_app();
        let state = app.state.clone().with_max_upload_bytes(1024);
        let body = multipart_body(&recipient_fields(), Some(("big.bin", vec![7u8; 4096].as_slice())));
        let response = router(state).oneshot(upload_request(&session(), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(app.content.is_empty());
    }
}

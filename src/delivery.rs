// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Out-of-band delivery of access secrets.
//!
//! The access token (with its link) and the OTP travel over two independent
//! channels: primary (email) and secondary (SMS). Delivery failures are the
//! caller's to log; they never roll back a share.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use url::Url;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("delivery endpoint returned {0}")]
    Rejected(reqwest::StatusCode),
}

/// What the primary channel carries.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryDelivery<'a> {
    pub contact: &'a str,
    pub token: &'a str,
    pub link: &'a str,
    pub file_name: &'a str,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Access token and download link.
    async fn send_primary(&self, delivery: PrimaryDelivery<'_>) -> Result<(), DeliveryError>;

    /// The one-time code.
    async fn send_secondary(&self, contact: &str, otp: &str) -> Result<(), DeliveryError>;

    /// Tell the recipient a share is no longer available.
    async fn send_revocation(&self, contact: &str, file_name: &str) -> Result<(), DeliveryError>;
}

/// Logs who would have been contacted. Secrets are not logged.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_primary(&self, delivery: PrimaryDelivery<'_>) -> Result<(), DeliveryError> {
        info!(
            channel = "primary",
            to = %delivery.contact,
            file_name = %delivery.file_name,
            expires_at = %delivery.expires_at,
            "Access link ready (log-only delivery)"
        );
        Ok(())
    }

    async fn send_secondary(&self, contact: &str, _otp: &str) -> Result<(), DeliveryError> {
        info!(channel = "secondary", to = %contact, "One-time code ready (log-only delivery)");
        Ok(())
    }

    async fn send_revocation(&self, contact: &str, file_name: &str) -> Result<(), DeliveryError> {
        info!(channel = "primary", to = %contact, file_name = %file_name, "Revocation notice (log-only delivery)");
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WebhookMessage<'a> {
    AccessLink {
        to: &'a str,
        token: &'a str,
        link: &'a str,
        file_name: &'a str,
        expires_at: DateTime<Utc>,
    },
    OneTimeCode {
        to: &'a str,
        otp: &'a str,
    },
    Revoked {
        to: &'a str,
        file_name: &'a str,
    },
}

/// Posts JSON messages to per-channel webhooks (e.g. a mail or SMS relay).
/// A channel without a URL falls back to [`LogNotifier`].
pub struct WebhookNotifier {
    client: reqwest::Client,
    primary: Option<Url>,
    secondary: Option<Url>,
}

impl WebhookNotifier {
    pub fn new(primary: Option<Url>, secondary: Option<Url>) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            primary,
            secondary,
        })
    }

    async fn post(&self, url: &Url, message: &WebhookMessage<'_>) -> Result<(), DeliveryError> {
        let response = self.client.post(url.clone()).json(message).send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_primary(&self, delivery: PrimaryDelivery<'_>) -> Result<(), DeliveryError> {
        let Some(url) = &self.primary else {
            return LogNotifier.send_primary(delivery).await;
        };
        let message = WebhookMessage::AccessLink {
            to: delivery.contact,
            token: delivery.token,
            link: delivery.link,
            file_name: delivery.file_name,
            expires_at: delivery.expires_at,
        };
        self.post(url, &message).await?;
        info!(channel = "primary", to = %delivery.contact, "Access link delivered");
        Ok(())
    }

    async fn send_secondary(&self, contact: &str, otp: &str) -> Result<(), DeliveryError> {
        let Some(url) = &self.secondary else {
            return LogNotifier.send_secondary(contact, otp).await;
        };
        self.post(url, &WebhookMessage::OneTimeCode { to: contact, otp }).await?;
        info!(channel = "secondary", to = %contact, "One-time code delivered");
        Ok(())
    }

    async fn send_revocation(&self, contact: &str, file_name: &str) -> Result<(), DeliveryError> {
        let Some(url) = &self.primary else {
            return LogNotifier.send_revocation(contact, file_name).await;
        };
        self.post(url, &WebhookMessage::Revoked { to: contact, file_name })
            .await
    }
}

/// Append `token` to the public download URL as a query parameter.
pub fn download_link(base: &Url, token: &str) -> String {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("token", token);
    url.to_string()
}

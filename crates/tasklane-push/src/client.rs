use std::time::Duration;

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::debug;

use tasklane_types::models::{NotificationPayload, PushSubscription};

use crate::PushTransport;
use crate::encrypt::{decode_key, encrypt};
use crate::error::PushError;
use crate::vapid::VapidSigner;

/// Web Push delivery over HTTPS.
pub struct WebPushClient {
    http: reqwest::Client,
    vapid: VapidSigner,
    ttl_secs: u32,
}

impl WebPushClient {
    /// `timeout` bounds a single delivery request; `ttl_secs` is how long the
    /// push service may hold a message for an offline browser.
    pub fn new(vapid: VapidSigner, ttl_secs: u32, timeout: Duration) -> Result<Self, PushError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { http, vapid, ttl_secs })
    }

    pub fn public_key(&self) -> &str {
        self.vapid.public_key()
    }

    async fn deliver(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let p256dh = decode_key(&subscription.keys.p256dh)
            .map_err(|e| PushError::InvalidSubscription(format!("p256dh: {}", e)))?;
        let auth = decode_key(&subscription.keys.auth)
            .map_err(|e| PushError::InvalidSubscription(format!("auth: {}", e)))?;

        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| PushError::Encryption(e.to_string()))?;
        let body = encrypt(&p256dh, &auth, &plaintext)?;
        let authorization = self.vapid.authorization(&subscription.endpoint, Utc::now())?;

        let response = self
            .http
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Urgency", "normal")
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("Push delivered to {} ({})", subscription.endpoint, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PushError::from_status(status.as_u16(), body))
    }
}

impl PushTransport for WebPushClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        self.deliver(subscription, payload).await
    }
}

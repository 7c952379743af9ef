//! Payment gateway callback signatures
//!
//! Header format: `X-AgriLink-Signature: t=<unix seconds>,v1=<hex>` where the
//! MAC is HMAC-SHA256 over `"{t}.{raw body}"`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "x-agrilink-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Payment webhook is not configured")]
    NotConfigured,

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Malformed webhook signature")]
    MalformedSignature,

    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Invalid webhook signature")]
    InvalidSignature,
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NotConfigured => ApiError::ServiceUnavailable(err.to_string()),
            _ => ApiError::Unauthorized(err.to_string()),
        }
    }
}

/// Verifies signed gateway callbacks
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    /// Verify `header` against `body` at the current time
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        self.verify_at(body, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, body: &[u8], header: Option<&str>, now: i64) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;

        let mut timestamp: Option<&str> = None;
        let mut sig_v1: Option<&str> = None;
        for part in header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => sig_v1 = Some(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
        let sig_v1 = sig_v1.ok_or(WebhookError::MalformedSignature)?;

        let issued_at: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::MalformedSignature)?;
        if (now - issued_at).abs() > self.tolerance_seconds {
            tracing::warn!(issued_at, now, "Webhook timestamp outside tolerance");
            return Err(WebhookError::StaleTimestamp);
        }

        let expected = hex::decode(sig_v1).map_err(|_| WebhookError::MalformedSignature)?;

        let mut mac = self.mac()?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        // verify_slice compares in constant time
        mac.verify_slice(&expected).map_err(|_| {
            tracing::warn!("Webhook signature mismatch");
            WebhookError::InvalidSignature
        })
    }

    /// Produce a header value for `body`; used by tests and gateway simulators
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, WebhookError> {
        let mut mac = self.mac()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("t={},v1={}", timestamp, signature))
    }

    fn mac(&self) -> Result<HmacSha256, WebhookError> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| WebhookError::NotConfigured)
    }
}

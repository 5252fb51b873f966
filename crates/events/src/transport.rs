//! Push transports.
//!
//! A [`PushTransport`] exposes two separate entry points: one that only asks
//! the recipient's client to refresh in the background, and one that shows a
//! user-visible alert. [`deliver`] is the only place that chooses between
//! them, and it does so from a [`PushDelivery`], so a silent payload can
//! never reach [`PushTransport::present_alert`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tandem_core::classify::{classify, Classify, ErrorKind, RawError};
use tandem_core::notification::{PushDelivery, PushPayload};
use tandem_core::types::DbId;

/// HTTP request timeout for a single push attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("Push request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway returned a non-2xx status code.
    #[error("Push gateway returned HTTP {0}")]
    HttpStatus(u16),

    /// A failure reported by some other transport, carried as reported.
    #[error("Push failed: {0}")]
    Raw(RawError),
}

impl Classify for TransportError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            TransportError::Request(err) if err.is_timeout() => ErrorKind::NetworkTimeout,
            TransportError::Request(err) if err.is_connect() => ErrorKind::NetworkUnavailable,
            TransportError::Request(err) => classify(&RawError {
                code: None,
                status: err.status().map(|s| s.as_u16()),
                message: Some(err.to_string()),
            }),
            TransportError::HttpStatus(status) => {
                classify(&RawError::default().with_status(*status))
            }
            TransportError::Raw(raw) => classify(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// PushTransport
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Wake the recipient's client to pull fresh data. Never shows anything.
    async fn sync_in_background(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError>;

    /// Show a user-visible alert.
    async fn present_alert(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError>;
}

/// Route a classified payload to the matching transport entry point.
pub async fn deliver(
    transport: &dyn PushTransport,
    recipient_id: DbId,
    delivery: &PushDelivery,
) -> Result<(), TransportError> {
    match delivery {
        PushDelivery::Silent(payload) => transport.sync_in_background(recipient_id, payload).await,
        PushDelivery::Visible(payload) => transport.present_alert(recipient_id, payload).await,
    }
}

// ---------------------------------------------------------------------------
// WebhookTransport
// ---------------------------------------------------------------------------

/// Posts payloads to an HTTP push gateway.
///
/// The gateway receives `{recipient_id, mode, payload}` where `mode` is
/// `"background"` or `"alert"`. Attempts are not retried here; the
/// dispatcher records a failed attempt in the delivery log instead.
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(
        &self,
        recipient_id: DbId,
        mode: &str,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        let body = json!({
            "recipient_id": recipient_id,
            "mode": mode,
            "payload": payload,
        });
        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl PushTransport for WebhookTransport {
    async fn sync_in_background(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        self.post(recipient_id, "background", payload).await
    }

    async fn present_alert(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        self.post(recipient_id, "alert", payload).await
    }
}

// ---------------------------------------------------------------------------
// LogTransport
// ---------------------------------------------------------------------------

/// Writes every push to the log. Used when no gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl PushTransport for LogTransport {
    async fn sync_in_background(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        tracing::info!(recipient_id, kind = %payload.kind, "Background sync push");
        Ok(())
    }

    async fn present_alert(
        &self,
        recipient_id: DbId,
        payload: &PushPayload,
    ) -> Result<(), TransportError> {
        tracing::info!(
            recipient_id,
            kind = %payload.kind,
            title = payload.title.as_deref().unwrap_or_default(),
            "Alert push"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

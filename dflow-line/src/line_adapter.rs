//! [`MessagePlatform`] for the LINE Messaging API.

use crate::adapters::{LineEventWrapper, LineOutbound, WebhookBody};
use crate::config::LineConfig;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dflow_core::{DflowError, Event, MessagePlatform, OutboundMessage, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-line-signature";
const PUSH_PATH: &str = "/v2/bot/message/push";
const REPLY_PATH: &str = "/v2/bot/message/reply";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<LineOutbound>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<LineOutbound>,
}

/// LINE channel adapter. Holds one HTTP client for all push and reply calls.
pub struct LinePlatform {
    http: reqwest::Client,
    config: LineConfig,
}

impl LinePlatform {
    pub fn new(config: LineConfig) -> Result<Self> {
        Self::with_timeout(config, REQUEST_TIMEOUT)
    }

    /// Every push and reply call is abandoned after `timeout`.
    pub fn with_timeout(config: LineConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DflowError::Configuration(format!("Failed to build LINE HTTP client: {}", e))
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Base64 HMAC-SHA256 of `raw_body` keyed with the channel secret.
    pub fn sign(&self, raw_body: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.channel_secret.as_bytes()).ok()?;
        mac.update(raw_body);
        Some(STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.config.api_base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.channel_access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| DflowError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, path = %path, body = %body, "LINE API rejected message");
            return Err(DflowError::Delivery(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }
}

/// Constant-time string comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn to_line(messages: &[OutboundMessage]) -> Vec<LineOutbound> {
    messages.iter().map(LineOutbound::from).collect()
}

#[async_trait]
impl MessagePlatform for LinePlatform {
    fn name(&self) -> &str {
        "line"
    }

    fn signature_header(&self) -> &str {
        SIGNATURE_HEADER
    }

    fn validate_signature(&self, signature: &str, raw_body: &[u8]) -> bool {
        match self.sign(raw_body) {
            Some(expected) => constant_time_eq(&expected, signature.trim()),
            None => {
                warn!("failed to create HMAC");
                false
            }
        }
    }

    fn extract_events(&self, raw_body: &[u8]) -> Result<Vec<Event>> {
        let body: WebhookBody = serde_json::from_slice(raw_body)?;
        debug!(destination = ?body.destination, events = body.events.len(), "LINE webhook decoded");
        Ok(body
            .events
            .iter()
            .map(|e| LineEventWrapper(e).to_core())
            .collect())
    }

    async fn send(&self, user_id: &str, messages: &[OutboundMessage]) -> Result<()> {
        info!(user_id = %user_id, count = messages.len(), "Pushing messages");
        self.post(
            PUSH_PATH,
            &PushRequest {
                to: user_id,
                messages: to_line(messages),
            },
        )
        .await
    }

    async fn reply(&self, reply_token: &str, messages: &[OutboundMessage]) -> Result<()> {
        info!(count = messages.len(), "Replying messages");
        self.post(
            REPLY_PATH,
            &ReplyRequest {
                reply_token,
                messages: to_line(messages),
            },
        )
        .await
    }
}

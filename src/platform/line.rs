//! LINE Messaging API: webhook payloads, signature checks and replies.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use crate::config::LineConfig;
use crate::platform::IncomingMessage;

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE rejects text messages longer than this.
const MAX_TEXT_LEN: usize = 5000;
/// LINE accepts at most this many messages per reply.
const MAX_REPLY_MESSAGES: usize = 5;

type HmacSha256 = Hmac<Sha256>;

/// Check `signature` (base64 HMAC-SHA256 of the raw body keyed by the
/// channel secret). Comparison is constant time.
pub fn verify_signature(channel_secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(expected) = general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature LINE would send for `body`.
#[cfg(test)]
pub fn sign(channel_secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .context("Invalid channel secret")?;
    mac.update(body);
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

impl WebhookEvent {
    /// The text message carried by this event, if it is one we can answer.
    pub fn text_message(&self) -> Option<IncomingMessage> {
        if self.event_type != "message" {
            return None;
        }
        let message = self.message.as_ref()?;
        if message.message_type != "text" {
            return None;
        }

        Some(IncomingMessage {
            user_id: self.source.as_ref().and_then(|s| s.user_id.clone()),
            reply_token: self.reply_token.clone()?,
            text: message.text.clone()?,
            is_redelivery: self
                .delivery_context
                .as_ref()
                .is_some_and(|d| d.is_redelivery),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest {
    reply_token: String,
    messages: Vec<TextMessage>,
}

#[derive(Debug, Serialize)]
struct TextMessage {
    #[serde(rename = "type")]
    message_type: &'static str,
    text: String,
}

/// Sends replies through the Messaging API.
pub struct LineClient {
    client: reqwest::Client,
    api_base_url: String,
    access_token: String,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build LINE API client")?;
        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.channel_access_token.clone(),
        })
    }

    pub async fn reply(&self, reply_token: &str, text: &str) -> Result<()> {
        let messages = split_message(text, MAX_TEXT_LEN)
            .into_iter()
            .take(MAX_REPLY_MESSAGES)
            .map(|text| TextMessage {
                message_type: "text",
                text,
            })
            .collect();

        let request = ReplyRequest {
            reply_token: reply_token.to_string(),
            messages,
        };

        let url = format!("{}/v2/bot/message/reply", self.api_base_url);
        debug!("Sending reply to LINE: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send reply to LINE")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("LINE API error ({}): {}", status, error_body);
        }

        Ok(())
    }
}

/// Split long replies under the per-message length limit, preferring line
/// and word boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

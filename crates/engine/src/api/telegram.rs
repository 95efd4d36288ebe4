//! Telegram Bot API client: outbound messages, photos, webhook registration,
//! and the inbound update shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::DEFAULT_TELEGRAM_URL;
use crate::error::{SignalError, SignalResult};
use crate::notify::Notifier;

const PHOTO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

// ---------------------------------------------------------------------------
// Inbound webhook payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// Chat id and trimmed text of a new message. A message without text
    /// (photo, sticker) yields "" so the sender still gets the help reply.
    pub fn command(&self) -> Option<(String, String)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref().unwrap_or("").trim();
        Some((message.chat.id.to_string(), text.to_string()))
    }
}

/// `{"ok": bool, "description": ...}` envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl TelegramClient {
    pub fn new(token: &str, timeout: Duration) -> SignalResult<Self> {
        Self::with_base_url(DEFAULT_TELEGRAM_URL, token, timeout)
    }

    pub fn with_base_url(base_url: &str, token: &str, timeout: Duration) -> SignalResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    /// Register `{public_url}/{token}` as the webhook target
    pub async fn set_webhook(&self, public_url: &str) -> SignalResult<()> {
        let hook = format!("{}/{}", public_url.trim_end_matches('/'), self.token);
        let response = self
            .client
            .post(self.method_url("setWebhook"))
            .form(&[("url", hook.as_str())])
            .send()
            .await
            .map_err(|e| SignalError::NotifyFailure(format!("setWebhook: {}", e)))?;

        check_response("setWebhook", response).await?;
        info!(url = %public_url, "Webhook registered");
        Ok(())
    }
}

async fn check_response(method: &str, response: Response) -> SignalResult<()> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SignalError::NotifyFailure(format!("{}: {}", method, e)))?;

    let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();
    match parsed {
        Some(api) if api.ok && status.is_success() => Ok(()),
        Some(api) => Err(SignalError::NotifyFailure(format!(
            "{} {}: {}",
            method,
            status,
            api.description.unwrap_or_default()
        ))),
        None => Err(SignalError::NotifyFailure(format!(
            "{} {}: {}",
            method, status, body
        ))),
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_text(&self, chat_id: &str, text: &str) -> SignalResult<()> {
        debug!(chat_id, len = text.len(), "sendMessage");
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .form(&[("chat_id", chat_id), ("text", text)])
            .send()
            .await
            .map_err(|e| SignalError::NotifyFailure(format!("sendMessage: {}", e)))?;

        check_response("sendMessage", response).await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        png: Vec<u8>,
        caption: Option<&str>,
    ) -> SignalResult<()> {
        debug!(chat_id, bytes = png.len(), "sendPhoto");
        let part = Part::bytes(png)
            .file_name("chart.png")
            .mime_str("image/png")
            .map_err(|e| SignalError::NotifyFailure(format!("sendPhoto: {}", e)))?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .timeout(PHOTO_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SignalError::NotifyFailure(format!("sendPhoto: {}", e)))?;

        check_response("sendPhoto", response).await
    }
}

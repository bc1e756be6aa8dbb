//! Telegram Bot API transport

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use super::{Notification, Notifier, NotifyError, CAPTION_LIMIT};
use crate::config::NotifyConfig;

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages and photos to one chat
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(NotifyError::MissingCredentials("bot_token"))?;
        let chat_id = config
            .chat_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(NotifyError::MissingCredentials("chat_id"))?;
        Self::new(&config.api_base, token, chat_id)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": false,
        });
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&body)
            .send()
            .await?;
        check_response(response).await
    }

    async fn send_photo(&self, caption: &str, image: &[u8]) -> Result<(), NotifyError> {
        let photo = Part::bytes(image.to_vec()).file_name("deal.png");
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", photo);
        let response = self
            .client
            .post(self.endpoint("sendPhoto"))
            .multipart(form)
            .send()
            .await?;
        check_response(response).await
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status().as_u16();
    let parsed: Option<ApiResponse> = response.json().await.ok();
    match parsed {
        Some(ApiResponse { ok: true, .. }) => Ok(()),
        Some(ApiResponse { description, .. }) => Err(NotifyError::Api {
            status,
            description: description.unwrap_or_else(|| "no description".to_string()),
        }),
        None => Err(NotifyError::Api {
            status,
            description: "unreadable response".to_string(),
        }),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// Photo with caption when an image is present, falling back to a text
    /// message if the photo upload fails
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(image) = &notification.image {
            if notification.text.chars().count() <= CAPTION_LIMIT {
                match self.send_photo(&notification.text, image).await {
                    Ok(()) => return Ok(()),
                    Err(e) => tracing::warn!("Photo upload failed, sending text only: {}", e),
                }
            }
        }
        self.send_message(&notification.text).await
    }
}

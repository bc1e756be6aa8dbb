//! Notification delivery
//!
//! The monitor hands a [`Notification`] to a [`Notifier`] and only looks at
//! success or failure. [`TelegramNotifier`] talks to the Bot API;
//! [`LogNotifier`] logs instead (dry runs).

pub mod compose;
pub mod message;
pub mod telegram;

pub use compose::{compose_with_timeout, ImageCompositor, OverlayCompositor};
pub use message::{affiliate_link, format_message, CAPTION_LIMIT};
pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API rejected the request (status {status}): {description}")]
    Api { status: u16, description: String },
    #[error("missing notification credentials: {0}")]
    MissingCredentials(&'static str),
}

/// Formatted message plus optional photo bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// HTML-formatted text
    pub text: String,
    /// Photo to attach (PNG or JPEG)
    pub image: Option<Vec<u8>>,
}

impl Notification {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(text: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            text: text.into(),
            image: Some(image),
        }
    }
}

/// Notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Logs notifications instead of sending them
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<usize>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications logged so far
    pub fn sent(&self) -> usize {
        self.sent.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Ok(mut n) = self.sent.lock() {
            *n += 1;
        }
        tracing::info!(
            image_bytes = notification.image.as_ref().map_or(0, Vec::len),
            "[dry-run] notification:\n{}",
            notification.text
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_counts() {
        let notifier = LogNotifier::new();
        notifier.notify(&Notification::text("<b>hi</b>")).await.unwrap();
        notifier
            .notify(&Notification::with_image("<b>hi</b>", vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(notifier.sent(), 2);
    }
}

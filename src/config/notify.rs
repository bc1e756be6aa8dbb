//! Telegram notification configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Bot token; `TELEGRAM_BOT_TOKEN` overrides
    pub bot_token: Option<String>,
    /// Target chat or channel; `TELEGRAM_CHAT_ID` overrides
    pub chat_id: Option<String>,
    /// Affiliate tag appended to product links; `DEALWATCH_REF_TAG` overrides
    pub affiliate_tag: Option<String>,
    /// Background image the product photo is pasted onto
    pub template_image: Option<PathBuf>,
    /// Upper bound for image composition (seconds)
    pub compose_timeout_secs: u64,
    /// Bot API base URL
    pub api_base: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            affiliate_tag: None,
            template_image: None,
            compose_timeout_secs: 5,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl NotifyConfig {
    pub fn compose_timeout(&self) -> Duration {
        Duration::from_secs(self.compose_timeout_secs)
    }

    /// Whether both credentials are present
    pub fn has_credentials(&self) -> bool {
        self.bot_token.as_deref().is_some_and(|t| !t.is_empty())
            && self.chat_id.as_deref().is_some_and(|c| !c.is_empty())
    }
}

//! Configuration for dealwatch

mod dedup;
mod fetch;
mod filter;
mod logging;
mod monitor;
mod notify;

pub use dedup::{DedupConfig, MAX_RETENTION_HOURS};
pub use fetch::FetchSettings;
pub use filter::FilterConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use monitor::{MonitorConfig, NotifyMode, Target, TargetKind};
pub use notify::NotifyConfig;

pub use crate::scraping::extractor::ExtractorConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Browser user agents rotated across requests
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Environment variable overriding `notify.bot_token`
pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable overriding `notify.chat_id`
pub const ENV_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
/// Environment variable overriding `notify.affiliate_tag`
pub const ENV_REF_TAG: &str = "DEALWATCH_REF_TAG";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config = Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override secrets from the environment; empty values are ignored
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(ENV_BOT_TOKEN) {
            self.notify.bot_token = Some(token);
        }
        if let Some(chat) = get(ENV_CHAT_ID) {
            self.notify.chat_id = Some(chat);
        }
        if let Some(tag) = get(ENV_REF_TAG) {
            self.notify.affiliate_tag = Some(tag);
        }
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Monitor
        if self.monitor.targets.is_empty() {
            errors.push("monitor.targets must not be empty".to_string());
        }
        for target in &self.monitor.targets {
            match Url::parse(&target.url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(_) => errors.push(format!("target URL must be http(s): {}", target.url)),
                Err(e) => errors.push(format!("invalid target URL '{}': {}", target.url, e)),
            }
        }
        if let Some(base) = &self.monitor.base_url {
            if let Err(e) = Url::parse(base) {
                errors.push(format!("invalid monitor.base_url '{}': {}", base, e));
            }
        }
        if self.monitor.poll_interval_secs == 0 {
            errors.push("poll_interval_secs must be positive".to_string());
        }
        if self.monitor.start_hour > 23 {
            errors.push("start_hour must be between 0 and 23".to_string());
        }
        if self.monitor.end_hour > 24 {
            errors.push("end_hour must be between 0 and 24".to_string());
        }
        if self.monitor.max_consecutive_failures == 0 {
            errors.push("max_consecutive_failures must be positive".to_string());
        }

        // Fetch
        if self.fetch.max_attempts == 0 {
            errors.push("max_attempts must be positive".to_string());
        }
        if self.fetch.min_request_delay_ms > self.fetch.max_request_delay_ms {
            errors.push("min_request_delay_ms must not exceed max_request_delay_ms".to_string());
        }
        if self.fetch.timeout_secs == 0 {
            errors.push("timeout_secs must be positive".to_string());
        }
        if self.fetch.user_agents.is_empty() {
            errors.push("user_agents must not be empty".to_string());
        }
        if self.fetch.max_content_size == 0 {
            errors.push("max_content_size must be positive".to_string());
        }

        // Filter
        if self.filter.max_price <= rust_decimal::Decimal::ZERO {
            errors.push("max_price must be positive".to_string());
        }
        if self.filter.min_discount > 100 {
            errors.push("min_discount must be <= 100".to_string());
        }

        // Dedup
        if self.dedup.retention_hours == 0 {
            errors.push("retention_hours must be positive".to_string());
        }
        if self.dedup.retention_hours > MAX_RETENTION_HOURS {
            errors.push(format!("retention_hours must be <= {}", MAX_RETENTION_HOURS));
        }
        if self.dedup.path.as_os_str().is_empty() {
            errors.push("dedup path must not be empty".to_string());
        }

        // Notify
        if self.notify.compose_timeout_secs == 0 {
            errors.push("compose_timeout_secs must be positive".to_string());
        }
        if let Err(e) = Url::parse(&self.notify.api_base) {
            errors.push(format!("invalid notify.api_base '{}': {}", self.notify.api_base, e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

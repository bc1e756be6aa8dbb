//! Polling loop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a target URL points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Search / listing page with many item blocks
    #[default]
    Listing,
    /// Single product page
    Product,
}

/// One monitored page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    #[serde(default)]
    pub kind: TargetKind,
}

impl Target {
    pub fn listing(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TargetKind::Listing,
        }
    }

    pub fn product(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: TargetKind::Product,
        }
    }
}

/// How many eligible candidates a cycle notifies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMode {
    /// Stop after the first successful notification
    #[default]
    FirstEligible,
    /// Notify every eligible candidate
    AllEligible,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Pages polled every cycle, in order
    pub targets: Vec<Target>,
    /// Seconds between cycles
    pub poll_interval_secs: u64,
    /// Extra random seconds added to each interval
    pub interval_jitter_secs: u64,
    /// First local hour of the active window (inclusive)
    pub start_hour: u32,
    /// End of the active window (exclusive), 0-24
    pub end_hour: u32,
    pub notify_mode: NotifyMode,
    /// Consecutive failed cycles before the monitor gives up
    pub max_consecutive_failures: u32,
    /// Fetch detail pages of chosen listing items for title/image/reviews
    pub enrich_from_detail: bool,
    /// Base for relative listing links; defaults to the listing page URL
    pub base_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            targets: vec![Target::listing("https://www.amazon.it/s?k=funko+pop")],
            poll_interval_secs: 3600,
            interval_jitter_secs: 60,
            start_hour: 8,
            end_hour: 20,
            notify_mode: NotifyMode::FirstEligible,
            max_consecutive_failures: 5,
            enrich_from_detail: true,
            base_url: None,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn interval_jitter(&self) -> Duration {
        Duration::from_secs(self.interval_jitter_secs)
    }
}

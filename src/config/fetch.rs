//! HTTP fetch configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::DEFAULT_USER_AGENTS;
use crate::scraping::fetcher::{FetchConfig, RetryPolicy};
use crate::scraping::politeness::PolitenessConfig;

/// Retry, pacing and header settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Total attempts per fetch, including the first
    pub max_attempts: u32,
    /// Backoff base for timeouts and 5xx (milliseconds)
    pub base_delay_ms: u64,
    /// Backoff base for 429/503 (milliseconds)
    pub throttle_delay_ms: u64,
    /// Ceiling for a single backoff (seconds)
    pub max_backoff_secs: u64,
    pub retryable_statuses: Vec<u16>,
    /// Randomized delay before each attempt (milliseconds)
    pub min_request_delay_ms: u64,
    pub max_request_delay_ms: u64,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Rotated per attempt
    pub user_agents: Vec<String>,
    pub accept_language: String,
    /// Maximum response size (bytes)
    pub max_content_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2000,
            throttle_delay_ms: 30_000,
            max_backoff_secs: 600,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            min_request_delay_ms: 5000,
            max_request_delay_ms: 20_000,
            timeout_secs: 10,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            accept_language: "it-IT,it;q=0.9,en;q=0.8".to_string(),
            max_content_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl FetchSettings {
    /// Engine configuration for these settings
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                throttle_delay: Duration::from_millis(self.throttle_delay_ms),
                max_delay: Duration::from_secs(self.max_backoff_secs),
                retryable_statuses: self.retryable_statuses.clone(),
            },
            politeness: PolitenessConfig {
                user_agents: self.user_agents.clone(),
                accept_language: self.accept_language.clone(),
                min_delay: Duration::from_millis(self.min_request_delay_ms),
                max_delay: Duration::from_millis(self.max_request_delay_ms),
            },
            timeout: Duration::from_secs(self.timeout_secs),
            max_content_size: self.max_content_size,
        }
    }
}

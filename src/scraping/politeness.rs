//! Request pacing and header rotation
//!
//! Every attempt waits a random delay first and presents a randomly chosen
//! user agent, so that consecutive requests do not look like a fixed-rate bot.

use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

use crate::config::DEFAULT_USER_AGENTS;

/// Configuration for request pacing
#[derive(Debug, Clone)]
pub struct PolitenessConfig {
    /// Pool of user agent strings to rotate through
    pub user_agents: Vec<String>,
    /// Accept-Language header value
    pub accept_language: String,
    /// Lower bound of the randomized pre-request delay
    pub min_delay: Duration,
    /// Upper bound of the randomized pre-request delay
    pub max_delay: Duration,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            accept_language: "it-IT,it;q=0.9,en;q=0.8".to_string(),
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(20),
        }
    }
}

/// Stateless pacing helper; randomness comes from the thread-local RNG
#[derive(Debug, Clone)]
pub struct Politeness {
    config: PolitenessConfig,
}

impl Politeness {
    pub fn new(config: PolitenessConfig) -> Self {
        Self { config }
    }

    /// Pick a user agent from the pool
    pub fn user_agent(&self) -> &str {
        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    /// Headers for a single attempt
    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".to_string(), self.user_agent().to_string()),
            ("Accept-Language".to_string(), self.config.accept_language.clone()),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
        ]
    }

    /// Random delay to wait before an attempt, uniform in `[min_delay, max_delay]`
    pub fn pre_request_delay(&self) -> Duration {
        let min = self.config.min_delay;
        let max = self.config.max_delay;
        if max <= min {
            return min;
        }
        let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }

    pub fn config(&self) -> &PolitenessConfig {
        &self.config
    }
}

//! Notification dedup store configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on `retention_hours` (ten years)
pub const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

/// Dedup store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// JSON-lines file holding notified items
    pub path: PathBuf,
    /// How long a notification suppresses the same item
    pub retention_hours: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("notified.jsonl"),
            retention_hours: 120, // 5 days
        }
    }
}

impl DedupConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours.min(MAX_RETENTION_HOURS) as i64)
    }
}

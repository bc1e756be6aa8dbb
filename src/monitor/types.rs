//! Scheduler state, reports and errors

use serde::Serialize;
use thiserror::Error;

use crate::scraping::StorageError;

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// Outside working hours or between cycles
    Idle,
    /// A cycle is in progress
    Running,
}

/// Counters for one completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Targets fetched (product targets skipped as already notified excluded)
    pub targets_fetched: usize,
    /// Targets skipped because they were already notified
    pub targets_skipped: usize,
    /// Target fetches that failed
    pub fetch_failures: usize,
    /// Candidates extracted across all targets
    pub candidates: usize,
    /// Candidates passing the eligibility filter
    pub eligible: usize,
    /// Eligible candidates suppressed by the dedup store
    pub deduplicated: usize,
    /// Notifications delivered and recorded
    pub notified: usize,
    /// Notifications that failed (not recorded)
    pub notify_failures: usize,
}

/// Why a cycle failed as a whole
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("dedup store: {0}")]
    Storage(#[from] StorageError),
    #[error("all {attempted} target fetches failed; last error: {last}")]
    AllFetchesFailed { attempted: usize, last: String },
}

/// Result of one scheduler tick
#[derive(Debug)]
pub enum TickOutcome {
    /// Current local hour outside the window; nothing fetched
    OutsideHours { hour: u32 },
    /// Cycle ran to completion
    Completed(CycleReport),
    /// Cycle failed; the consecutive failure count is below the limit
    Failed(CycleError),
}

/// Fatal scheduler errors
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{count} consecutive cycles failed; last error: {last}")]
    TooManyFailures { count: u32, last: CycleError },
}

//! dealwatch: marketplace deal monitor
//!
//! Polls listing and product pages, extracts prices despite markup drift,
//! filters by price, discount and availability, and notifies each item at
//! most once per retention window:
//! - Fetching with retry, backoff and user-agent rotation
//! - Per-field strategy chains over HTML
//! - Locale-ambiguous price normalization
//! - TTL-bounded, file-backed notification dedup
//! - Working-hours gated polling loop with Telegram delivery

pub mod config;
pub mod monitor;
pub mod notify;
pub mod pricing;
pub mod scraping;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;

//! Eligibility thresholds

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Eligibility filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Highest acceptable current price (number or string, e.g. `60.0` or `"60.00"`)
    pub max_price: Decimal,
    /// Minimum discount (percent) when a discount is known
    pub min_discount: u32,
    /// Reject candidates without a known discount
    pub require_discount: bool,
    /// Reject candidates without an availability signal
    pub require_availability: bool,
    /// Seller text must contain this (case-insensitive), e.g. "Venduto da Amazon"
    pub required_seller: Option<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_price: Decimal::new(6000, 2),
            min_discount: 15,
            require_discount: false,
            require_availability: true,
            required_seller: None,
        }
    }
}

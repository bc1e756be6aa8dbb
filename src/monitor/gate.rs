//! Working-hours window and eligibility filter

use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::FilterConfig;
use crate::types::ProductCandidate;

/// Local-hour window `[start, end)` in which cycles run.
///
/// `start > end` wraps past midnight; `start == end` is always open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    start: u32,
    end: u32,
}

impl WorkingHours {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        use std::cmp::Ordering;
        match self.start.cmp(&self.end) {
            Ordering::Less => hour >= self.start && hour < self.end,
            Ordering::Greater => hour >= self.start || hour < self.end,
            Ordering::Equal => true,
        }
    }
}

/// Why a candidate was not eligible
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no current price")]
    NoPrice,
    #[error("price {price} above maximum {max}")]
    AboveMaxPrice { price: Decimal, max: Decimal },
    #[error("discount {discount}% below minimum {min}%")]
    DiscountTooLow { discount: u32, min: u32 },
    #[error("no discount")]
    NoDiscount,
    #[error("not available")]
    Unavailable,
    #[error("seller does not match {0:?}")]
    WrongSeller(String),
}

/// Price, discount, availability and seller test
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    config: FilterConfig,
}

impl EligibilityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// `Ok` when the candidate should be notified.
    ///
    /// An absent discount does not reject unless `require_discount` is set.
    pub fn evaluate(&self, candidate: &ProductCandidate) -> Result<(), Rejection> {
        let price = candidate.current_price.ok_or(Rejection::NoPrice)?;
        if price > self.config.max_price {
            return Err(Rejection::AboveMaxPrice {
                price,
                max: self.config.max_price,
            });
        }

        match candidate.discount_percent() {
            Some(discount) if discount < self.config.min_discount => {
                return Err(Rejection::DiscountTooLow {
                    discount,
                    min: self.config.min_discount,
                });
            }
            None if self.config.require_discount => return Err(Rejection::NoDiscount),
            _ => {}
        }

        if self.config.require_availability && candidate.availability.is_none() {
            return Err(Rejection::Unavailable);
        }

        if let Some(required) = self.config.required_seller.as_deref().filter(|s| !s.is_empty()) {
            let matches = candidate
                .seller
                .as_deref()
                .is_some_and(|s| s.to_lowercase().contains(&required.to_lowercase()));
            if !matches {
                return Err(Rejection::WrongSeller(required.to_string()));
            }
        }

        Ok(())
    }
}

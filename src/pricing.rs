//! Price text normalization
//!
//! Marketplace pages render prices in whatever locale the storefront uses:
//! `1.234,56 €`, `$1,234.56`, `12,99`. This module turns that text into a
//! `Decimal` without knowing the locale up front, and computes discounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Errors during price normalization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceError {
    #[error("no digits in price text {0:?}")]
    NoDigits(String),
    #[error("malformed price text {0:?}")]
    Malformed(String),
}

/// Convert locale-ambiguous price text to a decimal value.
///
/// Currency symbols, letters and whitespace are dropped. When both `,` and `.`
/// appear, whichever occurs last is the decimal separator. When only one of
/// them appears, it is a decimal separator if at most two digits follow its
/// last occurrence, otherwise a thousands separator.
pub fn normalize_price(text: &str) -> Result<Decimal, PriceError> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(PriceError::NoDigits(text.to_string()));
    }

    // "59," is what a whole-part span looks like on its own
    let cleaned = cleaned.trim_end_matches(|c| c == ',' || c == '.');

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');

    let canonical = match (last_comma, last_dot) {
        (None, None) => cleaned.to_string(),
        (Some(c), Some(d)) => {
            let (decimal, thousands) = if c > d { (',', '.') } else { ('.', ',') };
            let without_thousands: String = cleaned.chars().filter(|ch| *ch != thousands).collect();
            if without_thousands.matches(decimal).count() > 1 {
                return Err(PriceError::Malformed(text.to_string()));
            }
            without_thousands.replace(decimal, ".")
        }
        (Some(pos), None) => single_separator(cleaned, ',', pos),
        (None, Some(pos)) => single_separator(cleaned, '.', pos),
    };

    let canonical = if canonical.starts_with('.') {
        format!("0{}", canonical)
    } else {
        canonical
    };

    Decimal::from_str(&canonical).map_err(|_| PriceError::Malformed(text.to_string()))
}

/// Resolve text that only ever uses one separator character.
fn single_separator(cleaned: &str, sep: char, last_pos: usize) -> String {
    let trailing_digits = cleaned.len() - last_pos - sep.len_utf8();

    if trailing_digits <= 2 {
        let (head, tail) = cleaned.split_at(last_pos);
        let head: String = head.chars().filter(|c| *c != sep).collect();
        format!("{}.{}", head, &tail[sep.len_utf8()..])
    } else {
        cleaned.chars().filter(|c| *c != sep).collect()
    }
}

/// Percentage discount of `current` against `list`, rounded to a whole number.
///
/// Returns `None` unless `list > current`, and also when rounding leaves a
/// non-positive value: a "0%" discount is reported as no discount at all.
pub fn discount_percent(current: Decimal, list: Decimal) -> Option<u32> {
    if list <= Decimal::ZERO || list <= current {
        return None;
    }

    let hundred = Decimal::ONE_HUNDRED;
    let discount = (hundred - current / list * hundred).round();

    if discount <= Decimal::ZERO {
        return None;
    }
    discount.to_u32()
}

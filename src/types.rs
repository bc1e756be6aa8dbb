//! Core types for the monitoring pipeline

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{self, PriceError};

/// Title used when no extraction strategy produced one
pub const UNKNOWN_TITLE: &str = "unknown";

/// One scraped item instance.
///
/// Created fresh every cycle from fetched markup and dropped after the
/// eligibility/notify step; never persisted. Every field except the URL may be
/// missing, since markup drift is expected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductCandidate {
    /// Canonical URL (tracking stripped, click wrappers resolved)
    pub canonical_url: String,
    /// Marketplace item identifier (e.g. an ASIN)
    pub item_id: Option<String>,
    /// Product title, or [`UNKNOWN_TITLE`]
    pub title: String,
    /// Raw current price text as found on the page
    pub current_price_text: Option<String>,
    /// Raw list (strike-through) price text
    pub list_price_text: Option<String>,
    /// Normalized current price
    pub current_price: Option<Decimal>,
    /// Normalized list price
    pub list_price: Option<Decimal>,
    /// Best product image URL
    pub image_url: Option<String>,
    /// Review summary, display only
    pub reviews_text: Option<String>,
    /// Availability signal text
    pub availability: Option<String>,
    /// Seller / merchant text
    pub seller: Option<String>,
}

impl ProductCandidate {
    /// Create an empty candidate for a canonical URL
    pub fn new(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            item_id: None,
            title: UNKNOWN_TITLE.to_string(),
            current_price_text: None,
            list_price_text: None,
            current_price: None,
            list_price: None,
            image_url: None,
            reviews_text: None,
            availability: None,
            seller: None,
        }
    }

    /// Whether a real title was extracted
    pub fn has_title(&self) -> bool {
        self.title != UNKNOWN_TITLE
    }

    /// Normalize both raw price texts independently.
    ///
    /// A failure on one price leaves that price absent and does not affect the
    /// other. Errors are returned so the caller can log them.
    pub fn normalize_prices(&mut self) -> Vec<(PriceField, PriceError)> {
        let mut errors = Vec::new();

        self.current_price = match self.current_price_text.as_deref().map(pricing::normalize_price) {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                errors.push((PriceField::Current, e));
                None
            }
            None => None,
        };

        self.list_price = match self.list_price_text.as_deref().map(pricing::normalize_price) {
            Some(Ok(v)) => Some(v),
            Some(Err(e)) => {
                errors.push((PriceField::List, e));
                None
            }
            None => None,
        };

        errors
    }

    /// Derived discount, present only when both prices exist and list > current
    pub fn discount_percent(&self) -> Option<u32> {
        match (self.current_price, self.list_price) {
            (Some(current), Some(list)) => pricing::discount_percent(current, list),
            _ => None,
        }
    }

    /// Key used for notification deduplication
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            canonical_url: self.canonical_url.clone(),
            item_id: self.item_id.clone(),
        }
    }

    /// Fill display fields from a richer extraction of the same item.
    ///
    /// Prices stay untouched: eligibility was already decided on them.
    pub fn merge_display_fields(&mut self, detail: ProductCandidate) {
        if detail.has_title() {
            self.title = detail.title;
        }
        if detail.image_url.is_some() {
            self.image_url = detail.image_url;
        }
        if detail.reviews_text.is_some() {
            self.reviews_text = detail.reviews_text;
        }
        if self.seller.is_none() {
            self.seller = detail.seller;
        }
        if self.item_id.is_none() {
            self.item_id = detail.item_id;
        }
    }
}

/// Which price a normalization error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Current,
    List,
}

impl std::fmt::Display for PriceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => f.write_str("current price"),
            Self::List => f.write_str("list price"),
        }
    }
}

/// Identity of an item for notification suppression.
///
/// Two keys refer to the same item when their canonical URLs are equal or
/// when both carry the same item id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    pub canonical_url: String,
    pub item_id: Option<String>,
}

impl DedupKey {
    pub fn new(canonical_url: impl Into<String>, item_id: Option<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            item_id,
        }
    }
}

//! Product extraction from HTML
//!
//! Every field is found through an ordered chain of strategies (see
//! [`strategy`]). The first non-empty match wins; a field whose chain is
//! exhausted stays absent and the rest of the extraction carries on, so
//! markup drift degrades a candidate instead of failing it.

mod images;
mod strategy;
mod types;

pub use images::best_image_url;
pub use strategy::{FieldChain, Strategy, StrategyError};
pub use types::*;

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use super::{canonicalize_str, canonicalize_url, extract_item_id};
use crate::types::ProductCandidate;

/// Compiled chains for one page kind
struct FieldChains {
    title: FieldChain,
    current_price: FieldChain,
    list_price: FieldChain,
    reviews: FieldChain,
    image: FieldChain,
    availability: FieldChain,
    seller: Option<FieldChain>,
}

/// Product extractor
pub struct ProductExtractor {
    product: FieldChains,
    listing: FieldChains,
    item_selector: Option<Selector>,
    item_id_attr: String,
    link: FieldChain,
    unavailable_markers: Vec<String>,
}

impl ProductExtractor {
    /// Create an extractor, compiling every strategy up front
    pub fn new(config: &ExtractorConfig) -> Self {
        let p = &config.product;
        let product = FieldChains {
            title: FieldChain::compile("title", &p.title),
            current_price: FieldChain::compile("current_price", &p.current_price),
            list_price: FieldChain::compile("list_price", &p.list_price),
            reviews: FieldChain::compile("reviews", &p.reviews),
            image: FieldChain::compile("image", &p.image),
            availability: FieldChain::compile("availability", &p.availability),
            seller: Some(FieldChain::compile("seller", &p.seller)),
        };

        let l = &config.listing;
        let listing = FieldChains {
            title: FieldChain::compile("title", &l.title),
            current_price: FieldChain::compile("current_price", &l.current_price),
            list_price: FieldChain::compile("list_price", &l.list_price),
            reviews: FieldChain::compile("reviews", &l.reviews),
            image: FieldChain::compile("image", &l.image),
            availability: FieldChain::compile("availability", &l.availability),
            seller: None,
        };

        let item_selector = match Selector::parse(&l.item) {
            Ok(sel) => Some(sel),
            Err(_) => {
                tracing::warn!("Invalid listing item selector {:?}; listings will be empty", l.item);
                None
            }
        };

        Self {
            product,
            listing,
            item_selector,
            item_id_attr: l.item_id_attr.clone(),
            link: FieldChain::compile("link", &l.link),
            unavailable_markers: config
                .unavailable_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    /// Extract a single product page. Never fails; missing fields stay absent.
    pub fn extract_product(&self, html: &str, page_url: &Url) -> ProductCandidate {
        let document = Html::parse_document(html);
        let mut candidate = ProductCandidate::new(canonicalize_url(page_url));
        candidate.item_id = extract_item_id(page_url.as_str());

        self.fill_fields(&mut candidate, &self.product, document.root_element(), page_url);
        candidate
    }

    /// Extract every item block of a listing page, in page order.
    ///
    /// Blocks without a usable link or item id are skipped. Repeated items
    /// (same canonical URL or same item id) are kept once.
    pub fn extract_listing(&self, html: &str, page_url: &Url) -> Vec<ProductCandidate> {
        let Some(item_selector) = &self.item_selector else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        let mut seen_urls = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut candidates = Vec::new();

        for block in document.select(item_selector) {
            let Some(mut candidate) = self.listing_candidate(block, page_url) else {
                continue;
            };
            let repeated_id = candidate
                .item_id
                .as_ref()
                .is_some_and(|id| !seen_ids.insert(id.clone()));
            if !seen_urls.insert(candidate.canonical_url.clone()) || repeated_id {
                continue;
            }
            self.fill_fields(&mut candidate, &self.listing, block, page_url);
            candidates.push(candidate);
        }

        tracing::debug!("Extracted {} items from listing {}", candidates.len(), page_url);
        candidates
    }

    /// Identity of one listing block: canonical link plus item id
    fn listing_candidate(&self, block: ElementRef<'_>, page_url: &Url) -> Option<ProductCandidate> {
        let block_id = block
            .value()
            .attr(&self.item_id_attr)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| id.to_ascii_uppercase());

        let canonical = self
            .link
            .first_match_with(block, |raw| canonicalize_str(raw, Some(page_url)))
            .or_else(|| {
                let id = block_id.as_deref()?;
                canonicalize_str(&format!("/dp/{}", id), Some(page_url))
            })?;

        let mut candidate = ProductCandidate::new(canonical);
        candidate.item_id = block_id.or_else(|| extract_item_id(&candidate.canonical_url));
        Some(candidate)
    }

    fn fill_fields(
        &self,
        candidate: &mut ProductCandidate,
        chains: &FieldChains,
        scope: ElementRef<'_>,
        page_url: &Url,
    ) {
        let mut missing = Vec::new();

        match chains.title.first_match(scope) {
            Some(title) => candidate.title = title,
            None => missing.push(chains.title.name()),
        }

        candidate.current_price_text = chains.current_price.first_match(scope);
        if candidate.current_price_text.is_none() {
            missing.push(chains.current_price.name());
        }

        candidate.list_price_text = chains.list_price.first_match(scope);
        if candidate.list_price_text.is_none() {
            missing.push(chains.list_price.name());
        }

        candidate.reviews_text = chains.reviews.first_match(scope);

        candidate.image_url = chains
            .image
            .first_match_with(scope, |raw| best_image_url(raw, page_url));
        if candidate.image_url.is_none() {
            missing.push(chains.image.name());
        }

        candidate.availability = chains
            .availability
            .first_match(scope)
            .filter(|text| !self.is_unavailable(text));
        if candidate.availability.is_none() {
            missing.push(chains.availability.name());
        }

        if let Some(seller) = &chains.seller {
            candidate.seller = seller.first_match(scope);
        }

        for (field, error) in candidate.normalize_prices() {
            tracing::debug!("{} of {}: {}", field, candidate.canonical_url, error);
        }

        if !missing.is_empty() {
            tracing::debug!(
                "Missing fields for {}: {}",
                candidate.canonical_url,
                missing.join(", ")
            );
        }
    }

    /// Whether availability text carries an unavailability marker
    pub fn is_unavailable(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.unavailable_markers.iter().any(|m| text.contains(m.as_str()))
    }
}

impl Default for ProductExtractor {
    fn default() -> Self {
        Self::new(&ExtractorConfig::default())
    }
}

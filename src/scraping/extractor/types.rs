//! Extractor configuration: ordered strategy lists per field
//!
//! Each entry is a strategy spec string (see [`super::strategy::Strategy`]).
//! Lists are tried in order and the first non-empty match wins, so the most
//! specific selectors go first and broad fallbacks last. Update these when a
//! storefront changes its markup; no code change is needed.

use serde::{Deserialize, Serialize};

fn specs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Strategy lists for a single product (detail) page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSelectors {
    pub title: Vec<String>,
    pub current_price: Vec<String>,
    pub list_price: Vec<String>,
    pub reviews: Vec<String>,
    pub image: Vec<String>,
    pub availability: Vec<String>,
    pub seller: Vec<String>,
}

impl Default for ProductSelectors {
    fn default() -> Self {
        Self {
            title: specs(&["id:productTitle", "meta:og:title", "jsonld:name", "css:h1"]),
            current_price: specs(&[
                "id:priceblock_ourprice",
                "id:priceblock_dealprice",
                "id:priceblock_saleprice",
                "css:#corePrice_feature_div .a-price .a-offscreen",
                "css:span.a-price:not(.a-text-price) span.a-offscreen",
                "split:.a-price-whole|.a-price-fraction",
                "jsonld:offers.price",
            ]),
            list_price: specs(&[
                "css:span.priceBlockStrikePriceString",
                "css:span.a-price.a-text-price span.a-offscreen",
                "css:.basisPrice .a-offscreen",
            ]),
            reviews: specs(&[
                "id:acrCustomerReviewText",
                "css:#averageCustomerReviews .a-icon-alt",
            ]),
            image: specs(&[
                "meta:og:image",
                "attr:#landingImage@data-a-dynamic-image",
                "attr:#imgTagWrapperId img@data-a-dynamic-image",
                "attr:#landingImage@data-old-hires",
                "attr:#landingImage@src",
                "attr:#imgTagWrapperId img@src",
            ]),
            availability: specs(&[
                "id:availability",
                "exists:#add-to-cart-button",
                "exists:#buy-now-button",
            ]),
            seller: specs(&[
                "id:merchant-info",
                "css:#tabular-buybox .tabular-buybox-text",
                "id:sellerProfileTriggerId",
            ]),
        }
    }
}

/// Strategy lists for item blocks on a listing / search page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// CSS selector for one item block
    pub item: String,
    /// Attribute on the item block holding the item id
    pub item_id_attr: String,
    pub link: Vec<String>,
    pub title: Vec<String>,
    pub current_price: Vec<String>,
    pub list_price: Vec<String>,
    pub reviews: Vec<String>,
    pub image: Vec<String>,
    pub availability: Vec<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            item: "div[data-asin]".to_string(),
            item_id_attr: "data-asin".to_string(),
            link: specs(&[
                "attr:h2 a@href",
                "attr:a.a-link-normal.s-no-outline@href",
                "attr:a.a-link-normal@href",
            ]),
            title: specs(&["css:h2 span", "css:h2", "attr:img.s-image@alt"]),
            current_price: specs(&[
                "css:.a-price:not(.a-text-price) .a-offscreen",
                "split:.a-price-whole|.a-price-fraction",
            ]),
            list_price: specs(&[
                "css:.a-price.a-text-price .a-offscreen",
                "css:.a-price[data-a-strike] .a-offscreen",
            ]),
            reviews: specs(&["css:.a-icon-star-small .a-icon-alt", "css:span.a-icon-alt"]),
            image: specs(&["attr:img.s-image@srcset", "attr:img.s-image@src"]),
            availability: specs(&["exists:.a-price"]),
        }
    }
}

/// Configuration for product extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub product: ProductSelectors,
    pub listing: ListingSelectors,
    /// Availability texts containing any of these (case-insensitive) count as unavailable
    pub unavailable_markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            product: ProductSelectors::default(),
            listing: ListingSelectors::default(),
            unavailable_markers: specs(&[
                "non disponibile",
                "currently unavailable",
                "not available",
                "nicht verfügbar",
                "no disponible",
                "indisponible",
            ]),
        }
    }
}

//! Scraping subsystem for the deal monitor
//!
//! Key components:
//! - `FetchEngine`: GET with retry, backoff and jitter over an `HttpTransport`
//! - `Politeness`: user-agent rotation and randomized pre-request delay
//! - `ProductExtractor`: ordered per-field strategy chains over HTML
//! - `DedupStore`: persisted, TTL-evicted record of notified items
//!
//! URL canonicalization lives here because both the extractor and the dedup
//! store depend on it.

pub mod dedup;
pub mod extractor;
pub mod fetcher;
pub mod politeness;

pub use dedup::{DedupRecord, DedupStore, StorageError};
pub use extractor::ProductExtractor;
pub use fetcher::{FetchEngine, FetchError, HttpTransport, ReqwestTransport, RetryPolicy};
pub use politeness::Politeness;

use url::Url;

/// Query parameters that only carry tracking or session state
const TRACKING_PARAMS: &[&str] = &[
    "tag",
    "ref",
    "ref_",
    "qid",
    "sr",
    "keywords",
    "crid",
    "sprefix",
    "psc",
    "smid",
    "th",
    "content-id",
    "dib",
    "dib_tag",
    "_encoding",
    "spla",
    "fbclid",
    "gclid",
    "sid",
    "sessionid",
];

/// Prefixes of tracking parameter families
const TRACKING_PREFIXES: &[&str] = &["utm_", "pf_rd_", "pd_rd_"];

/// Path fragments that mark a sponsored click wrapper
const CLICK_WRAPPER_PATHS: &[&str] = &["/sspa/click", "/gp/slredirect/"];

/// Path patterns carrying a ten character item id
const ITEM_ID_MARKERS: &[&str] = &["/dp/", "/gp/product/", "/gp/aw/d/"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str())
        || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Resolve a sponsored click wrapper to the URL it redirects to.
///
/// Returns `None` when `url` is not a wrapper or carries no usable target.
fn unwrap_click_redirect(url: &Url) -> Option<Url> {
    if !CLICK_WRAPPER_PATHS.iter().any(|p| url.path().contains(p)) {
        return None;
    }

    // query_pairs() already percent-decodes the value
    let target = url
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())?;

    url.join(&target).ok()
}

/// Canonicalize a URL for deduplication.
///
/// - Resolves sponsored click wrappers (nested wrappers included)
/// - Strips fragments
/// - Removes `/ref=...` path segments
/// - Strips tracking query parameters, keeping the rest in original order
pub fn canonicalize_url(url: &Url) -> String {
    let mut current = url.clone();
    // Bounded so a self-referencing wrapper cannot loop forever
    for _ in 0..4 {
        match unwrap_click_redirect(&current) {
            Some(target) => current = target,
            None => break,
        }
    }

    let mut canonical = current;
    canonical.set_fragment(None);

    let path = canonical.path().to_string();
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.starts_with("ref="))
        .collect();
    let mut new_path = segments.join("/");
    if new_path.len() > 1 && new_path.ends_with('/') {
        new_path.pop();
    }
    if new_path.is_empty() {
        new_path.push('/');
    }
    canonical.set_path(&new_path);

    let kept: Vec<(String, String)> = canonical
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        canonical.set_query(None);
    } else {
        canonical.query_pairs_mut().clear().extend_pairs(kept);
    }

    canonical.to_string()
}

/// Parse and canonicalize a URL string, resolving it against `base` when relative.
pub fn canonicalize_str(raw: &str, base: Option<&Url>) -> Option<String> {
    let parsed = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    Some(canonicalize_url(&parsed))
}

/// Extract a marketplace item id (ASIN-style, ten alphanumerics) from a URL path.
pub fn extract_item_id(url: &str) -> Option<String> {
    for marker in ITEM_ID_MARKERS {
        if let Some(pos) = url.find(marker) {
            let rest = &url[pos + marker.len()..];
            let id: String = rest.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
            if id.len() == 10 {
                return Some(id.to_ascii_uppercase());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> String {
        canonicalize_url(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_tracking_params_stripped() {
        let a = canon("https://www.amazon.it/dp/B0F1G6H7DR?tag=abc-21&utm_source=x&psc=1");
        let b = canon("https://www.amazon.it/dp/B0F1G6H7DR");
        assert_eq!(a, b);
        assert_eq!(b, "https://www.amazon.it/dp/B0F1G6H7DR");
    }

    #[test]
    fn test_non_tracking_params_kept() {
        let a = canon("https://shop.example.com/item?id=42&utm_medium=mail");
        assert_eq!(a, "https://shop.example.com/item?id=42");
    }

    #[test]
    fn test_ref_path_segment_stripped() {
        let a = canon("https://www.amazon.it/gp/aw/d/B0F1G6H7DR/ref=ox_sc_saved_title_2?smid=A11IL2PNWYJU7H&psc=1");
        assert_eq!(a, "https://www.amazon.it/gp/aw/d/B0F1G6H7DR");
    }

    #[test]
    fn test_fragment_stripped() {
        assert_eq!(
            canon("https://www.amazon.it/dp/B0F1G6H7DR#reviews"),
            canon("https://www.amazon.it/dp/B0F1G6H7DR")
        );
    }

    #[test]
    fn test_click_wrapper_resolved() {
        let wrapped = canon(
            "https://www.amazon.it/sspa/click?ie=UTF8&spc=MTo&url=%2FFunko-Pop%2Fdp%2FB0F1G6H7DR%2Fref%3Dsr_1_1_sspa%3Fkeywords%3Dfunko%26psc%3D1",
        );
        let direct = canon("https://www.amazon.it/Funko-Pop/dp/B0F1G6H7DR?keywords=funko");
        assert_eq!(wrapped, direct);
        assert_eq!(wrapped, "https://www.amazon.it/Funko-Pop/dp/B0F1G6H7DR");
    }

    #[test]
    fn test_absolute_click_target() {
        let wrapped = canon(
            "https://www.amazon.it/sspa/click?url=https%3A%2F%2Fwww.amazon.it%2Fdp%2FB0F1G6H7DR%3Ftag%3Dx",
        );
        assert_eq!(wrapped, "https://www.amazon.it/dp/B0F1G6H7DR");
    }

    #[test]
    fn test_wrapper_without_target_is_kept() {
        let a = canon("https://www.amazon.it/sspa/click?ie=UTF8");
        assert_eq!(a, "https://www.amazon.it/sspa/click?ie=UTF8");
    }

    #[test]
    fn test_relative_resolution() {
        let base = Url::parse("https://www.amazon.it/s?k=funko+pop").unwrap();
        let a = canonicalize_str("/Funko/dp/B0F1G6H7DR/ref=sr_1_3?qid=1", Some(&base)).unwrap();
        assert_eq!(a, "https://www.amazon.it/Funko/dp/B0F1G6H7DR");
    }

    #[test]
    fn test_item_id_extraction() {
        assert_eq!(
            extract_item_id("https://www.amazon.it/Funko/dp/B0F1G6H7DR/ref=x").as_deref(),
            Some("B0F1G6H7DR")
        );
        assert_eq!(
            extract_item_id("https://www.amazon.it/gp/product/B0F1G6H7DR").as_deref(),
            Some("B0F1G6H7DR")
        );
        assert_eq!(
            extract_item_id("https://www.amazon.it/gp/aw/d/B0F1G6H7DR?psc=1").as_deref(),
            Some("B0F1G6H7DR")
        );
        assert_eq!(extract_item_id("https://www.amazon.it/s?k=funko"), None);
        assert_eq!(extract_item_id("https://www.amazon.it/dp/SHORT"), None);
    }
}

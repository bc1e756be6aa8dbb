//! Deal message formatting (Telegram HTML parse mode)

use url::Url;

use crate::types::ProductCandidate;
use crate::util::{escape_html, truncate_str};

/// Telegram's photo caption limit, in characters
pub const CAPTION_LIMIT: usize = 1024;

const PRICE_UNAVAILABLE: &str = "Prezzo non disponibile";
const NO_REVIEWS: &str = "0 recensioni";
const BUY_LABEL: &str = "Acquista ora su Amazon";

/// Append the affiliate tag to a product URL, replacing any existing `tag`
pub fn affiliate_link(canonical_url: &str, tag: Option<&str>) -> String {
    let Some(tag) = tag.filter(|t| !t.is_empty()) else {
        return canonical_url.to_string();
    };
    let Ok(mut url) = Url::parse(canonical_url) else {
        return canonical_url.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "tag")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("tag", tag);
    url.to_string()
}

/// Price lines: discount plus strike-through list price when a discount
/// exists, otherwise the current price alone
fn price_lines(candidate: &ProductCandidate) -> Vec<String> {
    let current = candidate
        .current_price_text
        .as_deref()
        .map(escape_html)
        .unwrap_or_else(|| PRICE_UNAVAILABLE.to_string());

    match (candidate.discount_percent(), candidate.list_price_text.as_deref()) {
        (Some(discount), Some(list)) => vec![
            format!("🔻 Sconto: {}%", discount),
            format!("✂️ <s>{}</s> → <b>{}</b>", escape_html(list), current),
        ],
        _ => vec![format!("💰 <b>{}</b>", current)],
    }
}

fn render(title: &str, candidate: &ProductCandidate, link: &str) -> String {
    let mut lines = vec![format!("📍 <b>{}</b>", escape_html(title)), String::new()];
    lines.extend(price_lines(candidate));
    lines.push(String::new());
    lines.push(format!(
        "🔗 <a href=\"{}\">{}</a>",
        escape_html(link),
        BUY_LABEL
    ));
    lines.push(format!(
        "⭐ {}",
        escape_html(candidate.reviews_text.as_deref().unwrap_or(NO_REVIEWS))
    ));
    lines.join("\n")
}

/// Format a candidate as an HTML message of at most `limit` characters.
///
/// Only the title is shortened, so markup stays balanced.
pub fn format_message(candidate: &ProductCandidate, link: &str, limit: usize) -> String {
    let message = render(&candidate.title, candidate, link);
    let length = message.chars().count();
    if length <= limit {
        return message;
    }

    // Escaping can only lengthen the title, so shorten the raw title by the
    // overflow and retry until it fits
    let mut budget = candidate
        .title
        .chars()
        .count()
        .saturating_sub(length - limit);
    loop {
        let message = render(&truncate_str(&candidate.title, budget), candidate, link);
        if message.chars().count() <= limit || budget == 0 {
            return message;
        }
        budget = budget.saturating_sub(16);
    }
}

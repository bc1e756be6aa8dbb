//! Field extraction strategies
//!
//! A strategy is written as `kind:argument`:
//!
//! | spec                         | yields                                      |
//! |------------------------------|---------------------------------------------|
//! | `id:productTitle`            | text of the element with that id            |
//! | `css:h2 span`                | text of the first matching element          |
//! | `attr:img.s-image@srcset`    | attribute of the first matching element     |
//! | `meta:og:image`              | `content` of a meta tag by property or name |
//! | `exists:#add-to-cart-button` | element text, or `available` if it is empty |
//! | `jsonld:offers.price`        | value from embedded JSON-LD                 |
//! | `split:.whole\|.fraction`     | `whole.fraction` digits of a split price    |
//!
//! Empty results count as no match, so the next strategy is tried.

use scraper::{ElementRef, Selector};
use std::collections::HashMap;
use thiserror::Error;

/// Errors when parsing a strategy spec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("unknown strategy kind in {0:?}")]
    UnknownKind(String),
    #[error("invalid selector in {0:?}")]
    InvalidSelector(String),
    #[error("malformed strategy {0:?}")]
    Malformed(String),
}

/// One way of finding a field value
#[derive(Debug, Clone)]
pub enum Strategy {
    Text(Selector),
    Attr(Selector, String),
    Meta(Selector),
    Exists(Selector),
    JsonLd(String),
    Split(Selector, Selector),
}

fn selector(css: &str, spec: &str) -> Result<Selector, StrategyError> {
    Selector::parse(css).map_err(|_| StrategyError::InvalidSelector(spec.to_string()))
}

/// Collapse whitespace runs and trim; `None` when nothing is left
fn clean_text(raw: &str) -> Option<String> {
    let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

impl Strategy {
    /// Parse a `kind:argument` spec
    pub fn parse(spec: &str) -> Result<Self, StrategyError> {
        let (kind, arg) = spec
            .split_once(':')
            .ok_or_else(|| StrategyError::Malformed(spec.to_string()))?;
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(StrategyError::Malformed(spec.to_string()));
        }

        match kind.trim() {
            "id" => Ok(Self::Text(selector(&format!("[id=\"{}\"]", arg), spec)?)),
            "css" => Ok(Self::Text(selector(arg, spec)?)),
            "attr" => {
                let (css, attr) = arg
                    .rsplit_once('@')
                    .ok_or_else(|| StrategyError::Malformed(spec.to_string()))?;
                if attr.trim().is_empty() {
                    return Err(StrategyError::Malformed(spec.to_string()));
                }
                Ok(Self::Attr(selector(css, spec)?, attr.trim().to_string()))
            }
            "meta" => Ok(Self::Meta(selector(
                &format!("meta[property=\"{0}\"], meta[name=\"{0}\"]", arg),
                spec,
            )?)),
            "exists" => Ok(Self::Exists(selector(arg, spec)?)),
            "jsonld" => Ok(Self::JsonLd(arg.to_string())),
            "split" => {
                let (whole, fraction) = arg
                    .split_once('|')
                    .ok_or_else(|| StrategyError::Malformed(spec.to_string()))?;
                Ok(Self::Split(selector(whole, spec)?, selector(fraction, spec)?))
            }
            _ => Err(StrategyError::UnknownKind(spec.to_string())),
        }
    }

    /// Apply this strategy within `scope` (a whole document's root or one item block)
    pub fn apply(&self, scope: ElementRef<'_>) -> Option<String> {
        match self {
            Self::Text(sel) => scope
                .select(sel)
                .find_map(|el| clean_text(&el.text().collect::<String>())),
            Self::Attr(sel, attr) => scope
                .select(sel)
                .find_map(|el| el.value().attr(attr).and_then(clean_text)),
            Self::Meta(sel) => scope
                .select(sel)
                .find_map(|el| el.value().attr("content").and_then(clean_text)),
            Self::Exists(sel) => scope.select(sel).next().map(|el| {
                clean_text(&el.text().collect::<String>()).unwrap_or_else(|| "available".to_string())
            }),
            Self::JsonLd(key) => json_ld_values(scope).remove(key),
            Self::Split(whole_sel, fraction_sel) => {
                let whole: String = scope
                    .select(whole_sel)
                    .next()?
                    .text()
                    .collect::<String>()
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                if whole.is_empty() {
                    return None;
                }
                let fraction: String = scope
                    .select(fraction_sel)
                    .next()
                    .map(|el| el.text().collect::<String>())
                    .unwrap_or_default()
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect();
                if fraction.is_empty() {
                    Some(whole)
                } else {
                    Some(format!("{}.{}", whole, fraction))
                }
            }
        }
    }
}

/// Collect JSON-LD blocks under `scope` as dotted-path key/value pairs.
///
/// Arrays keep the parent path, so `offers[0].price` is `offers.price`.
/// The first value seen for a path wins.
fn json_ld_values(scope: ElementRef<'_>) -> HashMap<String, String> {
    let mut data = HashMap::new();
    let Ok(sel) = Selector::parse("script[type='application/ld+json']") else {
        return data;
    };

    for script in scope.select(&sel) {
        let json_text = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_text) {
            flatten_json_ld(&value, "", &mut data);
        }
    }

    data
}

fn flatten_json_ld(value: &serde_json::Value, prefix: &str, data: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_json_ld(val, &path, data);
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr {
                flatten_json_ld(item, prefix, data);
            }
        }
        serde_json::Value::String(s) if !prefix.is_empty() => {
            if let Some(s) = clean_text(s) {
                data.entry(prefix.to_string()).or_insert(s);
            }
        }
        serde_json::Value::Number(n) if !prefix.is_empty() => {
            data.entry(prefix.to_string()).or_insert_with(|| n.to_string());
        }
        _ => {}
    }
}

/// Ordered strategies for one field
#[derive(Debug, Clone)]
pub struct FieldChain {
    name: &'static str,
    strategies: Vec<Strategy>,
}

impl FieldChain {
    /// Compile spec strings, logging and skipping invalid ones
    pub fn compile(name: &'static str, specs: &[String]) -> Self {
        let strategies = specs
            .iter()
            .filter_map(|spec| match Strategy::parse(spec) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!("Ignoring {} strategy: {}", name, e);
                    None
                }
            })
            .collect();
        Self { name, strategies }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// First non-empty result across the chain
    pub fn first_match(&self, scope: ElementRef<'_>) -> Option<String> {
        self.strategies.iter().find_map(|s| s.apply(scope))
    }

    /// First result that `accept` maps to a value
    pub fn first_match_with<T>(
        &self,
        scope: ElementRef<'_>,
        mut accept: impl FnMut(&str) -> Option<T>,
    ) -> Option<T> {
        self.strategies
            .iter()
            .filter_map(|s| s.apply(scope))
            .find_map(|raw| accept(&raw))
    }
}

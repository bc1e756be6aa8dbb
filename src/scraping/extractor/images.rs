//! Product image selection
//!
//! Image attributes come in three shapes: a plain URL, a `srcset` list with
//! width (`w`) or density (`x`) descriptors, and a JSON object mapping URLs
//! to `[width, height]` (`data-a-dynamic-image`). The largest candidate wins;
//! ties go to the one listed first (JSON maps keep their source order).

use url::Url;

/// One image candidate and its size score
#[derive(Debug, Clone, PartialEq)]
struct ImageCandidate {
    url: String,
    score: f64,
}

/// Pick the best image URL from a raw attribute value, resolved against `base`.
///
/// Returns `None` for empty values, `data:` URIs and anything that does not
/// resolve to an http(s) URL.
pub fn best_image_url(raw: &str, base: &Url) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let candidates = if raw.starts_with('{') {
        parse_dynamic_image(raw)
    } else if looks_like_srcset(raw) {
        parse_srcset(raw)
    } else {
        vec![ImageCandidate {
            url: raw.to_string(),
            score: 0.0,
        }]
    };

    // Stable max: on equal score the earlier candidate stays
    let mut best: Option<(ImageCandidate, Url)> = None;
    for candidate in candidates {
        let Some(resolved) = resolve_http(&candidate.url, base) else {
            continue;
        };
        match &best {
            Some((current, _)) if current.score >= candidate.score => {}
            _ => best = Some((candidate, resolved)),
        }
    }

    best.map(|(_, url)| url.to_string())
}

fn resolve_http(raw: &str, base: &Url) -> Option<Url> {
    if raw.starts_with("data:") {
        return None;
    }
    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// `{"https://a.jpg":[500,500],"https://b.jpg":[1000,1000]}`, scored by area
fn parse_dynamic_image(raw: &str) -> Vec<ImageCandidate> {
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Vec::new();
    };

    map.into_iter()
        .map(|(url, dims)| {
            let score = match dims.as_array() {
                Some(d) if d.len() >= 2 => {
                    d[0].as_f64().unwrap_or(0.0) * d[1].as_f64().unwrap_or(0.0)
                }
                _ => 0.0,
            };
            ImageCandidate { url, score }
        })
        .collect()
}

fn looks_like_srcset(raw: &str) -> bool {
    raw.contains(',') || raw.split_whitespace().nth(1).is_some()
}

/// Parse a `srcset` value.
///
/// URLs may themselves contain commas, so a candidate ends at whitespace and
/// only a comma that follows the descriptor separates entries.
fn parse_srcset(raw: &str) -> Vec<ImageCandidate> {
    let mut candidates = Vec::new();
    let mut rest = raw;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let mut url = &rest[..url_end];
        rest = &rest[url_end..];

        let mut descriptor = "";
        if url.ends_with(',') {
            url = url.trim_end_matches(',');
        } else {
            let desc_end = rest.find(',').unwrap_or(rest.len());
            descriptor = rest[..desc_end].trim();
            rest = &rest[desc_end..];
        }

        if !url.is_empty() {
            candidates.push(ImageCandidate {
                url: url.to_string(),
                score: descriptor_score(descriptor),
            });
        }
    }

    candidates
}

/// `640w` scores 640, `2x` scores 2; missing or unreadable scores 1 (as `1x`)
fn descriptor_score(descriptor: &str) -> f64 {
    let descriptor = descriptor.trim();
    let parsed = descriptor
        .strip_suffix('w')
        .or_else(|| descriptor.strip_suffix('x'))
        .and_then(|n| n.parse::<f64>().ok());
    parsed.unwrap_or(1.0)
}

use anyhow::{Context, Result};
use dealwatch::{
    config::Config,
    monitor::EligibilityFilter,
    notify::{affiliate_link, format_message, CAPTION_LIMIT},
    scraping::{FetchEngine, ProductExtractor},
};
use url::Url;

/// Fetch one product page and print what the monitor would see and send
pub async fn check_url(config: Config, url: String) -> Result<()> {
    let url = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;

    let fetcher = FetchEngine::new(config.fetch.to_fetch_config())?;
    let response = fetcher.fetch(&url).await?;
    println!(
        "Fetched {} (status {}, {} attempt(s), {:.1}s)",
        response.final_url,
        response.status_code,
        response.attempts,
        response.fetch_duration.as_secs_f64()
    );

    let extractor = ProductExtractor::new(&config.extractor);
    let candidate = extractor.extract_product(&response.text(), &url);

    println!("\nCandidate:");
    println!("{}", serde_json::to_string_pretty(&candidate)?);
    match candidate.discount_percent() {
        Some(d) => println!("Discount: {}%", d),
        None => println!("Discount: none"),
    }

    let filter = EligibilityFilter::new(config.filter.clone());
    match filter.evaluate(&candidate) {
        Ok(()) => println!("Eligible: yes"),
        Err(reason) => println!("Eligible: no ({})", reason),
    }

    let link = affiliate_link(&candidate.canonical_url, config.notify.affiliate_tag.as_deref());
    println!("\nMessage preview:\n{}", format_message(&candidate, &link, CAPTION_LIMIT));

    Ok(())
}

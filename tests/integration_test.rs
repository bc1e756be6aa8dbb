//! End-to-end monitor cycles against scripted pages
//!
//! The transport serves fixed HTML and image bytes by URL; the notifier
//! records what it was asked to send and can be told to fail.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use dealwatch::{
    config::{Config, NotifyMode, Target},
    monitor::{CycleError, Monitor, MonitorError, TickOutcome},
    notify::{Notification, Notifier, NotifyError},
    scraping::{
        fetcher::{RawResponse, TransportError},
        DedupStore, FetchEngine, HttpTransport,
    },
    DedupKey,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use url::Url;

const PRODUCT_URL: &str = "https://www.amazon.it/dp/B0F1G6H7DR";
const LISTING_URL: &str = "https://www.amazon.it/s?k=funko+pop";
const IMAGE_URL: &str = "https://m.media-amazon.com/images/I/spiderman.jpg";

const PRODUCT_PAGE: &str = r#"<html><head>
    <meta property="og:image" content="https://m.media-amazon.com/images/I/spiderman.jpg">
    </head><body>
    <span id="productTitle">Funko Pop! Marvel: Spider-Man</span>
    <div id="corePrice_feature_div">
      <span class="a-price"><span class="a-offscreen">59,99 €</span></span>
    </div>
    <span class="a-price a-text-price"><span class="a-offscreen">79,99 €</span></span>
    <span id="acrCustomerReviewText">812 voti</span>
    <div id="availability"><span>Disponibilità immediata</span></div>
    </body></html>"#;

const LISTING_PAGE: &str = r#"<html><body>
    <div data-asin="B0000000A1">
      <h2><a href="/dp/B0000000A1/ref=sr_1_1"><span>Funko Pop Batman</span></a></h2>
      <span class="a-price"><span class="a-offscreen">59,99 €</span></span>
      <span class="a-price a-text-price"><span class="a-offscreen">79,99 €</span></span>
    </div>
    <div data-asin="B0000000A2">
      <h2><a href="/dp/B0000000A2/ref=sr_1_2"><span>Funko Pop Joker</span></a></h2>
      <span class="a-price"><span class="a-offscreen">45,00 €</span></span>
      <span class="a-price a-text-price"><span class="a-offscreen">90,00 €</span></span>
    </div>
    <div data-asin="B0000000A3">
      <h2><a href="/dp/B0000000A3/ref=sr_1_3"><span>Funko Pop Superman</span></a></h2>
      <span class="a-price"><span class="a-offscreen">75,00 €</span></span>
      <span class="a-price a-text-price"><span class="a-offscreen">99,00 €</span></span>
    </div>
    </body></html>"#;

/// Serves registered URLs, 404 for everything else, and logs requests
#[derive(Default)]
struct ScriptedSite {
    pages: HashMap<String, Vec<u8>>,
    offline: bool,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSite {
    fn with_page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedSite {
    async fn get(&self, url: &Url, _headers: &[(String, String)]) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        if self.offline {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (status, body) = match self.pages.get(url.as_str()) {
            Some(body) => (200, body.clone()),
            None => (404, Vec::new()),
        };
        Ok(RawResponse {
            status,
            final_url: url.clone(),
            body,
        })
    }
}

/// Records notifications; fails while `failing` is set
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Api {
                status: 502,
                description: "Bad Gateway".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn base_config(dir: &TempDir, targets: Vec<Target>) -> Config {
    let mut config = Config::default();
    config.monitor.targets = targets;
    config.monitor.enrich_from_detail = false;
    config.dedup.path = dir.path().join("notified.jsonl");
    config.fetch.max_attempts = 1;
    config.fetch.min_request_delay_ms = 0;
    config.fetch.max_request_delay_ms = 0;
    config.notify.affiliate_tag = Some("deals-21".to_string());
    config
}

fn build(config: &Config, site: Arc<ScriptedSite>, notifier: Arc<RecordingNotifier>) -> Monitor {
    let fetcher = FetchEngine::with_transport(config.fetch.to_fetch_config(), site);
    Monitor::new(config, fetcher, notifier)
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
}

fn completed(outcome: TickOutcome) -> dealwatch::monitor::CycleReport {
    match outcome {
        TickOutcome::Completed(report) => report,
        other => panic!("expected a completed cycle, got {:?}", other),
    }
}

fn stored(config: &Config, at: DateTime<Utc>, key: &DedupKey) -> bool {
    let mut store = DedupStore::new(config.dedup.path.clone(), config.dedup.retention());
    store.load(at).unwrap();
    store.contains(key)
}

fn listing_key(id: &str) -> DedupKey {
    DedupKey::new(format!("https://www.amazon.it/dp/{}", id), Some(id.to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_discounted_product_is_notified_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::product(PRODUCT_URL)]);
    let site = Arc::new(
        ScriptedSite::default()
            .with_page(PRODUCT_URL, PRODUCT_PAGE)
            .with_page(IMAGE_URL, b"jpeg bytes".to_vec()),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site.clone(), notifier.clone());

    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    assert_eq!(report.candidates, 1);
    assert_eq!(report.eligible, 1);
    assert_eq!(report.notified, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Funko Pop! Marvel: Spider-Man"));
    assert!(sent[0].text.contains("🔻 Sconto: 25%"));
    assert!(sent[0].text.contains("<s>79,99 €</s> → <b>59,99 €</b>"));
    assert!(sent[0].text.contains("https://www.amazon.it/dp/B0F1G6H7DR?tag=deals-21"));
    assert_eq!(sent[0].image.as_deref(), Some(&b"jpeg bytes"[..]));

    let key = DedupKey::new(PRODUCT_URL, Some("B0F1G6H7DR".to_string()));
    assert!(stored(&config, noon(), &key));

    // Second cycle: already notified, so the page is not even fetched
    let before = site.requests().len();
    let report = completed(monitor.tick_at(11, noon() + ChronoDuration::hours(1)).await.unwrap());
    assert_eq!(report.targets_skipped, 1);
    assert_eq!(report.notified, 0);
    assert_eq!(site.requests().len(), before);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_image_sends_text_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::product(PRODUCT_URL)]);
    let site = Arc::new(ScriptedSite::default().with_page(PRODUCT_URL, PRODUCT_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site, notifier.clone());

    completed(monitor.tick_at(10, noon()).await.unwrap());
    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].image.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_outside_working_hours_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::product(PRODUCT_URL)]);
    let site = Arc::new(ScriptedSite::default().with_page(PRODUCT_URL, PRODUCT_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site.clone(), notifier.clone());

    let outcome = monitor.tick_at(22, noon()).await.unwrap();
    assert!(matches!(outcome, TickOutcome::OutsideHours { hour: 22 }));
    assert!(site.requests().is_empty());
    assert!(notifier.sent().is_empty());
    assert!(!config.dedup.path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_first_eligible_stops_after_one() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::listing(LISTING_URL)]);
    let site = Arc::new(ScriptedSite::default().with_page(LISTING_URL, LISTING_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site, notifier.clone());

    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    assert_eq!(report.candidates, 3);
    assert_eq!(report.notified, 1);
    assert!(notifier.sent()[0].text.contains("Funko Pop Batman"));

    // The next cycle moves on to the next eligible item
    let report = completed(monitor.tick_at(11, noon() + ChronoDuration::hours(1)).await.unwrap());
    assert_eq!(report.deduplicated, 1);
    assert_eq!(report.notified, 1);
    assert!(notifier.sent()[1].text.contains("Funko Pop Joker"));

    let report = completed(monitor.tick_at(12, noon() + ChronoDuration::hours(2)).await.unwrap());
    assert_eq!(report.notified, 0);
    assert_eq!(report.deduplicated, 2);
}

#[tokio::test(start_paused = true)]
async fn test_all_eligible_notifies_every_match() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(&dir, vec![Target::listing(LISTING_URL)]);
    config.monitor.notify_mode = NotifyMode::AllEligible;
    let site = Arc::new(ScriptedSite::default().with_page(LISTING_URL, LISTING_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site, notifier.clone());

    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    // Superman is above the default 60.00 cap
    assert_eq!(report.eligible, 2);
    assert_eq!(report.notified, 2);
    assert!(stored(&config, noon(), &listing_key("B0000000A1")));
    assert!(stored(&config, noon(), &listing_key("B0000000A2")));
    assert!(!stored(&config, noon(), &listing_key("B0000000A3")));
}

#[tokio::test(start_paused = true)]
async fn test_price_and_discount_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(&dir, vec![Target::listing(LISTING_URL)]);
    config.monitor.notify_mode = NotifyMode::AllEligible;
    config.filter.max_price = Decimal::from_str("50.00").unwrap();
    let site = Arc::new(ScriptedSite::default().with_page(LISTING_URL, LISTING_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site.clone(), notifier.clone());

    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    assert_eq!(report.eligible, 1);
    assert!(notifier.sent()[0].text.contains("Funko Pop Joker"));

    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(&dir, vec![Target::listing(LISTING_URL)]);
    config.monitor.notify_mode = NotifyMode::AllEligible;
    config.filter.min_discount = 30;
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site, notifier.clone());

    // Batman is 25% off, Joker 50%
    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    assert_eq!(report.eligible, 1);
    assert!(notifier.sent()[0].text.contains("Funko Pop Joker"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_notification_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::product(PRODUCT_URL)]);
    let site = Arc::new(ScriptedSite::default().with_page(PRODUCT_URL, PRODUCT_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    notifier.failing.store(true, Ordering::SeqCst);
    let mut monitor = build(&config, site, notifier.clone());

    let report = completed(monitor.tick_at(10, noon()).await.unwrap());
    assert_eq!(report.notify_failures, 1);
    assert_eq!(report.notified, 0);
    let key = DedupKey::new(PRODUCT_URL, Some("B0F1G6H7DR".to_string()));
    assert!(!stored(&config, noon(), &key));

    // Delivery recovers: the same item goes out on the next cycle
    notifier.failing.store(false, Ordering::SeqCst);
    let report = completed(monitor.tick_at(11, noon() + ChronoDuration::hours(1)).await.unwrap());
    assert_eq!(report.notified, 1);
    assert!(stored(&config, noon(), &key));
}

#[tokio::test(start_paused = true)]
async fn test_notification_repeats_after_retention() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(&dir, vec![Target::product(PRODUCT_URL)]);
    let site = Arc::new(ScriptedSite::default().with_page(PRODUCT_URL, PRODUCT_PAGE));
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site, notifier.clone());

    completed(monitor.tick_at(10, noon()).await.unwrap());

    let just_before = noon() + ChronoDuration::hours(120) - ChronoDuration::seconds(1);
    let report = completed(monitor.tick_at(10, just_before).await.unwrap());
    assert_eq!(report.notified, 0);

    let expired = noon() + ChronoDuration::hours(120);
    let report = completed(monitor.tick_at(10, expired).await.unwrap());
    assert_eq!(report.notified, 1);
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_site_stops_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(&dir, vec![Target::listing(LISTING_URL)]);
    config.fetch.max_attempts = 3;
    config.fetch.base_delay_ms = 100;
    config.monitor.max_consecutive_failures = 2;
    let site = Arc::new(ScriptedSite::offline());
    let notifier = Arc::new(RecordingNotifier::default());
    let mut monitor = build(&config, site.clone(), notifier.clone());

    let first = monitor.tick_at(10, noon()).await.unwrap();
    assert!(matches!(first, TickOutcome::Failed(CycleError::AllFetchesFailed { attempted: 1, .. })));
    assert_eq!(site.requests().len(), 3);

    let second = monitor.tick_at(11, noon()).await;
    assert!(matches!(second, Err(MonitorError::TooManyFailures { count: 2, .. })));
    assert!(notifier.sent().is_empty());
}

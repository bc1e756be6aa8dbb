//! Polling scheduler
//!
//! One [`Monitor`] owns the fetch engine, extractor, dedup store and
//! notifier. Each tick checks the working-hours window and, inside it, runs
//! a cycle:
//!
//! 1. load the dedup store (evict + compact)
//! 2. fetch every target and extract candidates
//! 3. normalize prices and apply the eligibility filter
//! 4. skip candidates already notified
//! 5. notify, then record on success
//!
//! A cycle fails when the store cannot be read or written, or when every
//! target fetch failed. Too many consecutive failures stop the monitor.

mod gate;
mod types;

pub use gate::{EligibilityFilter, Rejection, WorkingHours};
pub use types::{CycleError, CycleReport, MonitorError, MonitorState, TickOutcome};

use chrono::{DateTime, Local, Timelike, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{Config, MonitorConfig, NotifyConfig, NotifyMode, TargetKind};
use crate::notify::{
    affiliate_link, compose_with_timeout, format_message, ImageCompositor, Notification, Notifier,
    CAPTION_LIMIT,
};
use crate::scraping::{canonicalize_url, extract_item_id, DedupStore, FetchEngine, ProductExtractor};
use crate::types::{DedupKey, ProductCandidate};

/// A candidate and the kind of page it came from
struct Found {
    kind: TargetKind,
    candidate: ProductCandidate,
}

/// Deal monitor
pub struct Monitor {
    config: MonitorConfig,
    notify_config: NotifyConfig,
    fetcher: FetchEngine,
    extractor: ProductExtractor,
    store: DedupStore,
    notifier: Arc<dyn Notifier>,
    compositor: Option<Arc<dyn ImageCompositor>>,
    hours: WorkingHours,
    filter: EligibilityFilter,
    state: MonitorState,
    consecutive_failures: u32,
    ignore_hours: bool,
}

impl Monitor {
    pub fn new(config: &Config, fetcher: FetchEngine, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: config.monitor.clone(),
            notify_config: config.notify.clone(),
            fetcher,
            extractor: ProductExtractor::new(&config.extractor),
            store: DedupStore::new(config.dedup.path.clone(), config.dedup.retention()),
            notifier,
            compositor: None,
            hours: WorkingHours::new(config.monitor.start_hour, config.monitor.end_hour),
            filter: EligibilityFilter::new(config.filter.clone()),
            state: MonitorState::Idle,
            consecutive_failures: 0,
            ignore_hours: false,
        }
    }

    /// Compose product photos onto a template before sending
    pub fn with_compositor(mut self, compositor: Arc<dyn ImageCompositor>) -> Self {
        self.compositor = Some(compositor);
        self
    }

    /// Run cycles regardless of the working-hours window
    pub fn ignore_working_hours(mut self, ignore: bool) -> Self {
        self.ignore_hours = ignore;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// One tick at the current local time
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        let now = Local::now();
        self.tick_at(now.hour(), now.with_timezone(&Utc)).await
    }

    /// One tick at an explicit local hour and instant
    pub async fn tick_at(&mut self, local_hour: u32, now: DateTime<Utc>) -> Result<TickOutcome, MonitorError> {
        if !self.ignore_hours && !self.hours.contains(local_hour) {
            debug!("Hour {} outside working hours, skipping cycle", local_hour);
            return Ok(TickOutcome::OutsideHours { hour: local_hour });
        }

        self.state = MonitorState::Running;
        let result = self.run_cycle(now).await;
        self.state = MonitorState::Idle;

        match result {
            Ok(report) => {
                self.consecutive_failures = 0;
                info!(
                    "Cycle complete: {} candidates, {} eligible, {} already notified, {} notified",
                    report.candidates, report.eligible, report.deduplicated, report.notified
                );
                Ok(TickOutcome::Completed(report))
            }
            Err(e) => {
                self.consecutive_failures += 1;
                error!(
                    "Cycle failed ({}/{}): {}",
                    self.consecutive_failures, self.config.max_consecutive_failures, e
                );
                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    return Err(MonitorError::TooManyFailures {
                        count: self.consecutive_failures,
                        last: e,
                    });
                }
                Ok(TickOutcome::Failed(e))
            }
        }
    }

    /// Tick until shutdown or a fatal error. The first cycle runs immediately.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), MonitorError> {
        info!(
            "Monitoring {} target(s) every {}s, active {:02}:00-{:02}:00",
            self.config.targets.len(),
            self.config.poll_interval_secs,
            self.config.start_hour,
            self.config.end_hour
        );

        loop {
            let interrupted = tokio::select! {
                outcome = self.tick() => {
                    if let TickOutcome::OutsideHours { hour } = outcome? {
                        info!("Outside working hours (hour {}), waiting", hour);
                    }
                    false
                }
                _ = shutdown.recv() => true,
            };
            if interrupted {
                self.state = MonitorState::Idle;
                info!("Shutdown requested during cycle");
                return Ok(());
            }

            let delay = self.next_delay();
            info!("Next check in {}s", delay.as_secs());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Monitor shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Poll interval plus uniform jitter
    pub fn next_delay(&self) -> Duration {
        let jitter = self.config.interval_jitter_secs;
        let extra = if jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter)
        };
        self.config.poll_interval() + Duration::from_secs(extra)
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();
        self.store.load(now)?;

        let found = self.collect_candidates(&mut report).await?;
        report.candidates = found.len();

        for Found { kind, mut candidate } in found {
            if let Err(reason) = self.filter.evaluate(&candidate) {
                debug!("Skipping {}: {}", candidate.canonical_url, reason);
                continue;
            }
            report.eligible += 1;

            // Checked per candidate so duplicates within one cycle are caught too
            if self.store.contains(&candidate.dedup_key()) {
                debug!("Already notified: {}", candidate.canonical_url);
                report.deduplicated += 1;
                continue;
            }

            if kind == TargetKind::Listing && self.config.enrich_from_detail {
                self.enrich(&mut candidate).await;
            }

            let notification = self.build_notification(&candidate).await;
            match self.notifier.notify(&notification).await {
                Ok(()) => {
                    self.store.record(&candidate.dedup_key(), now)?;
                    report.notified += 1;
                    info!("Notified: {} ({})", candidate.title, candidate.canonical_url);
                    if self.config.notify_mode == NotifyMode::FirstEligible {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Notification failed for {}: {}", candidate.canonical_url, e);
                    report.notify_failures += 1;
                }
            }
        }

        Ok(report)
    }

    async fn collect_candidates(&self, report: &mut CycleReport) -> Result<Vec<Found>, CycleError> {
        let mut found = Vec::new();
        let mut last_error = None;

        for target in &self.config.targets {
            let url = match Url::parse(&target.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping invalid target {}: {}", target.url, e);
                    continue;
                }
            };

            if target.kind == TargetKind::Product {
                let key = DedupKey::new(canonicalize_url(&url), extract_item_id(url.as_str()));
                if self.store.contains(&key) {
                    debug!("Product {} already notified, not fetching", key.canonical_url);
                    report.targets_skipped += 1;
                    continue;
                }
            }

            report.targets_fetched += 1;
            let response = match self.fetcher.fetch(&url).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Fetch failed for {}: {}", url, e);
                    report.fetch_failures += 1;
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let html = response.text();
            match target.kind {
                TargetKind::Product => {
                    let candidate = self.extractor.extract_product(&html, &url);
                    found.push(Found {
                        kind: target.kind,
                        candidate,
                    });
                }
                TargetKind::Listing => {
                    let base = self
                        .config
                        .base_url
                        .as_deref()
                        .and_then(|b| Url::parse(b).ok())
                        .unwrap_or(response.final_url);
                    found.extend(
                        self.extractor
                            .extract_listing(&html, &base)
                            .into_iter()
                            .map(|candidate| Found {
                                kind: target.kind,
                                candidate,
                            }),
                    );
                }
            }
        }

        if report.targets_fetched > 0 && report.fetch_failures == report.targets_fetched {
            return Err(CycleError::AllFetchesFailed {
                attempted: report.targets_fetched,
                last: last_error.unwrap_or_default(),
            });
        }

        Ok(found)
    }

    /// Fill title, image and reviews from the detail page; keeps listing data on failure
    async fn enrich(&self, candidate: &mut ProductCandidate) {
        let Ok(url) = Url::parse(&candidate.canonical_url) else {
            return;
        };
        match self.fetcher.fetch(&url).await {
            Ok(response) => {
                let detail = self.extractor.extract_product(&response.text(), &url);
                candidate.merge_display_fields(detail);
            }
            Err(e) => debug!("Detail enrichment failed for {}: {}", url, e),
        }
    }

    /// Message plus best available image: composed, then raw, then none
    async fn build_notification(&self, candidate: &ProductCandidate) -> Notification {
        let link = affiliate_link(
            &candidate.canonical_url,
            self.notify_config.affiliate_tag.as_deref(),
        );
        let text = format_message(candidate, &link, CAPTION_LIMIT);

        let Some(image_url) = candidate.image_url.as_deref().and_then(|u| Url::parse(u).ok()) else {
            return Notification::text(text);
        };

        let raw = match self.fetcher.fetch_bytes(&image_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Image fetch failed for {}: {}", image_url, e);
                return Notification::text(text);
            }
        };

        if let Some(compositor) = &self.compositor {
            let composed = compose_with_timeout(
                Arc::clone(compositor),
                raw.clone(),
                self.notify_config.compose_timeout(),
            )
            .await;
            if let Some(composed) = composed {
                return Notification::with_image(text, composed);
            }
        }

        Notification::with_image(text, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::scraping::fetcher::{HttpTransport, RawResponse, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Transport that fails every request and counts calls
    #[derive(Default)]
    struct Offline {
        calls: AtomicU32,
    }

    #[async_trait]
    impl HttpTransport for Offline {
        async fn get(&self, _url: &Url, _headers: &[(String, String)]) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    fn config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.dedup.path = dir.path().join("notified.jsonl");
        config.fetch.max_attempts = 1;
        config.fetch.min_request_delay_ms = 0;
        config.fetch.max_request_delay_ms = 0;
        config.monitor.max_consecutive_failures = 2;
        config
    }

    fn monitor(config: &Config, transport: Arc<Offline>) -> Monitor {
        let fetcher = FetchEngine::with_transport(config.fetch.to_fetch_config(), transport);
        Monitor::new(config, fetcher, Arc::new(LogNotifier::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_outside_hours_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(Offline::default());
        let mut monitor = monitor(&config(&dir), transport.clone());

        for hour in [0, 7, 20, 23] {
            let outcome = monitor.tick_at(hour, Utc::now()).await.unwrap();
            assert!(matches!(outcome, TickOutcome::OutsideHours { .. }));
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(Offline::default());
        let mut monitor = monitor(&config(&dir), transport.clone());

        let first = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(first, TickOutcome::Failed(CycleError::AllFetchesFailed { .. })));
        assert_eq!(monitor.consecutive_failures(), 1);

        let second = monitor.tick_at(10, Utc::now()).await;
        assert!(matches!(second, Err(MonitorError::TooManyFailures { count: 2, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignore_hours() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(Offline::default());
        let mut monitor = monitor(&config(&dir), transport.clone()).ignore_working_hours(true);

        let outcome = monitor.tick_at(3, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.monitor.start_hour = 0;
        cfg.monitor.end_hour = 0;
        cfg.monitor.max_consecutive_failures = 100;
        let mut monitor = monitor(&cfg, Arc::new(Offline::default()));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move {
            let result = monitor.run(rx).await;
            (result, monitor.consecutive_failures())
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(()).unwrap();

        let (result, failures) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(failures, 1);
    }

    const PRODUCT_PAGE: &str = r#"<html><body>
        <span id="productTitle">Funko Pop! Marvel: Spider-Man</span>
        <div id="corePrice_feature_div"><span class="a-price"><span class="a-offscreen">59,99 €</span></span></div>
        <span class="a-price a-text-price"><span class="a-offscreen">79,99 €</span></span>
        <div id="availability">Disponibilità immediata</div>
        </body></html>"#;

    /// Serves the product page while online, refuses connections otherwise
    struct Switchable {
        online: AtomicBool,
    }

    impl Switchable {
        fn new(online: bool) -> Self {
            Self {
                online: AtomicBool::new(online),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for Switchable {
        async fn get(&self, url: &Url, _headers: &[(String, String)]) -> Result<RawResponse, TransportError> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(TransportError::Connect("offline".to_string()));
            }
            Ok(RawResponse {
                status: 200,
                final_url: url.clone(),
                body: PRODUCT_PAGE.as_bytes().to_vec(),
            })
        }
    }

    /// Replaces the dedup file with a directory while "sending"
    struct BreaksStore {
        path: std::path::PathBuf,
        sent: AtomicU32,
    }

    #[async_trait]
    impl Notifier for BreaksStore {
        async fn notify(&self, _notification: &Notification) -> Result<(), crate::notify::NotifyError> {
            std::fs::create_dir_all(&self.path).unwrap();
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn product_config(dir: &tempfile::TempDir) -> Config {
        let mut cfg = config(dir);
        cfg.monitor.targets = vec![crate::config::Target::product("https://www.amazon.it/dp/B0F1G6H7DR")];
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycle_resets_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = product_config(&dir);
        let transport = Arc::new(Switchable::new(false));
        let fetcher = FetchEngine::with_transport(cfg.fetch.to_fetch_config(), transport.clone());
        let mut monitor = Monitor::new(&cfg, fetcher, Arc::new(LogNotifier::new()));

        let outcome = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert_eq!(monitor.consecutive_failures(), 1);

        transport.online.store(true, Ordering::SeqCst);
        let outcome = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Completed(_)));
        assert_eq!(monitor.consecutive_failures(), 0);

        // Limit is 2, so one more failure is not fatal
        transport.online.store(false, Ordering::SeqCst);
        let outcome = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(_)));
        assert_eq!(monitor.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_store_fails_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = product_config(&dir);
        // A directory where the store file should be
        cfg.dedup.path = dir.path().to_path_buf();
        let transport = Arc::new(Switchable::new(true));
        let notifier = Arc::new(LogNotifier::new());
        let fetcher = FetchEngine::with_transport(cfg.fetch.to_fetch_config(), transport);
        let mut monitor = Monitor::new(&cfg, fetcher, notifier.clone());

        let outcome = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(CycleError::Storage(_))));
        assert_eq!(notifier.sent(), 0);
        assert_eq!(monitor.consecutive_failures(), 1);

        let second = monitor.tick_at(10, Utc::now()).await;
        assert!(matches!(second, Err(MonitorError::TooManyFailures { count: 2, .. })));
        assert_eq!(notifier.sent(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_failure_fails_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = product_config(&dir);
        let notifier = Arc::new(BreaksStore {
            path: cfg.dedup.path.clone(),
            sent: AtomicU32::new(0),
        });
        let fetcher = FetchEngine::with_transport(cfg.fetch.to_fetch_config(), Arc::new(Switchable::new(true)));
        let mut monitor = Monitor::new(&cfg, fetcher, notifier.clone());

        let outcome = monitor.tick_at(10, Utc::now()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Failed(CycleError::Storage(_))));
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.consecutive_failures(), 1);
    }

    #[test]
    fn test_next_delay_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.monitor.poll_interval_secs = 100;
        cfg.monitor.interval_jitter_secs = 10;
        let monitor = monitor(&cfg, Arc::new(Offline::default()));

        for _ in 0..50 {
            let d = monitor.next_delay();
            assert!(d >= Duration::from_secs(100) && d <= Duration::from_secs(110));
        }
    }
}

use anyhow::{Context, Result};
use dealwatch::{
    config::Config,
    monitor::{Monitor, TickOutcome},
    notify::{ImageCompositor, LogNotifier, Notifier, OverlayCompositor, TelegramNotifier},
    scraping::FetchEngine,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

fn build_notifier(config: &Config, dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run {
        info!("Dry run: notifications are logged, not sent");
        return Ok(Arc::new(LogNotifier::new()));
    }
    let notifier = TelegramNotifier::from_config(&config.notify).context(
        "Telegram credentials missing: set notify.bot_token/notify.chat_id or TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID, or use --dry-run",
    )?;
    Ok(Arc::new(notifier))
}

fn build_compositor(config: &Config) -> Option<Arc<dyn ImageCompositor>> {
    let path = config.notify.template_image.as_ref()?;
    match OverlayCompositor::from_path(path) {
        Ok(compositor) => Some(Arc::new(compositor)),
        Err(e) => {
            warn!("Cannot load template image {}: {}; sending raw images", path.display(), e);
            None
        }
    }
}

pub fn build_monitor(config: &Config, dry_run: bool) -> Result<Monitor> {
    let notifier = build_notifier(config, dry_run)?;
    let fetcher = FetchEngine::new(config.fetch.to_fetch_config())?;
    let mut monitor = Monitor::new(config, fetcher, notifier);
    if let Some(compositor) = build_compositor(config) {
        monitor = monitor.with_compositor(compositor);
    }
    Ok(monitor)
}

/// Poll until Ctrl+C, SIGTERM or too many failed cycles
pub async fn run_monitor(config: Config, dry_run: bool) -> Result<()> {
    let mut monitor = build_monitor(&config, dry_run)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
            _ = wait_for_sigterm() => info!("Received SIGTERM, shutting down"),
        }
        let _ = signal_tx.send(());
    });

    monitor.run(shutdown_rx).await?;
    drop(shutdown_tx);
    Ok(())
}

/// Run a single cycle and print its report
pub async fn run_once(config: Config, dry_run: bool, ignore_hours: bool) -> Result<()> {
    let mut monitor = build_monitor(&config, dry_run)?.ignore_working_hours(ignore_hours);

    match monitor.tick().await? {
        TickOutcome::OutsideHours { hour } => {
            println!(
                "Outside working hours (hour {}, window {:02}:00-{:02}:00); use --ignore-hours to force",
                hour, config.monitor.start_hour, config.monitor.end_hour
            );
        }
        TickOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        TickOutcome::Failed(e) => {
            anyhow::bail!("Cycle failed: {}", e);
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

//! dealwatch: marketplace deal monitor
//!
//! Polls marketplace pages and notifies a Telegram chat about discounted items.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dealwatch::config::{Config, LogFormat, LoggingConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dealwatch")]
#[command(about = "Marketplace deal monitor with Telegram notifications")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "dealwatch.toml")]
    config: PathBuf,

    /// Verbosity level (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll targets until interrupted
    Run {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a single cycle and print its report
    Once {
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Run even outside working hours
        #[arg(long)]
        ignore_hours: bool,
    },

    /// Fetch one product page and show the extracted data and message
    Check {
        /// Product page URL
        url: String,
    },

    /// Evict expired dedup records and compact the store
    Prune,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directive(verbose)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Load the config file, or defaults plus environment when it does not exist
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if path.exists() {
        return Ok((Config::load(path)?, true));
    }
    let mut config = Config::default();
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok((config, false))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    if let Commands::Init { force } = cli.command {
        init_logging(&LoggingConfig::default(), cli.verbose)?;
        return commands::init_config(&cli.config, force);
    }

    let (config, from_file) = load_config(&cli.config)?;
    init_logging(&config.logging, cli.verbose)?;
    if !from_file {
        tracing::warn!(
            "Config file {} not found, using defaults (run `dealwatch init` to create one)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Run { dry_run } => commands::run_monitor(config, dry_run).await,
        Commands::Once {
            dry_run,
            ignore_hours,
        } => commands::run_once(config, dry_run, ignore_hours).await,
        Commands::Check { url } => commands::check_url(config, url).await,
        Commands::Prune => commands::prune_store(config),
        Commands::Init { .. } => Ok(()),
    }
}

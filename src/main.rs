//! Storage Watch Bot - Main Entry Point
//!
//! Scrapes a storage rental listing on a schedule and notifies Telegram
//! subscribers when a unit they watch becomes available.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use storage_watch_bot::commands::CommandHandler;
use storage_watch_bot::config::AppSettings;
use storage_watch_bot::notifier::{CooldownPolicy, NotificationSink, Notifier, OperatorChannel};
use storage_watch_bot::scheduler::Scheduler;
use storage_watch_bot::scraper::{HttpFetcher, ListingLayout, ListingParser, Scraper};
use storage_watch_bot::store::SqliteStore;
use storage_watch_bot::telegram::{Bot, RateLimiter, TelegramSink, run_bot};

/// Telegram bot that watches storage unit availability.
#[derive(Parser, Debug)]
#[command(name = "storage_watch_bot")]
#[command(about = "Notify Telegram subscribers when storage units become available")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error). Overrides LOG_LEVEL.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables
    let env_loaded = dotenvy::from_filename(&args.env_file);

    let settings = AppSettings::from_env().context("Invalid configuration")?;

    let level = args.log_level.as_deref().unwrap_or(&settings.log_level);
    init_logging(level, settings.is_production(), settings.log_file.as_deref())?;

    if let Err(e) = env_loaded {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    info!(
        environment = ?settings.environment,
        scrape_url = %settings.scrape.url,
        "Starting storage watch bot"
    );

    let store = Arc::new(
        SqliteStore::open(&settings.database_path).context("Failed to open the database")?,
    );

    let bot = Bot::new(&settings.telegram.bot_token);
    let limiter = Arc::new(RateLimiter::new(settings.telegram.send_interval));
    let sink: Arc<dyn NotificationSink> =
        Arc::new(TelegramSink::new(bot.clone(), Arc::clone(&limiter)));

    let fetcher = HttpFetcher::new(settings.scrape.http_timeout)
        .context("Failed to build the HTTP client")?;
    let layout = match &settings.scrape.layout_file {
        Some(path) => {
            info!(path = %path.display(), "Loading listing layout");
            ListingLayout::from_json_file(path)?
        }
        None => ListingLayout::default(),
    };
    let parser = ListingParser::new(layout).context("Invalid listing selectors")?;
    let scraper = Scraper::new(
        settings.scrape.url.to_string(),
        Arc::new(fetcher),
        parser,
        store.clone(),
    );

    let notifier = Notifier::new(
        store.clone(),
        store.clone(),
        Arc::clone(&sink),
        CooldownPolicy::new(settings.notify.cooldown),
    );

    let cancel = CancellationToken::new();

    let mut scheduler = Scheduler::new(cancel.clone());
    if let Some(chat_id) = settings.telegram.admin_chat_id {
        info!(chat_id, "Operator alerts enabled");
        scheduler = scheduler.with_alerts(OperatorChannel::new(Arc::clone(&sink), chat_id));
    }
    scheduler.spawn(Arc::new(scraper), settings.scrape.interval);
    scheduler.spawn(Arc::new(notifier), settings.notify.interval);

    let handler = Arc::new(CommandHandler::new(store.clone(), store.clone()));
    let bot_handle = tokio::spawn(run_bot(bot, handler, limiter, cancel.clone()));

    info!("Bot is running. Use Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutting down...");
    cancel.cancel();

    scheduler.wait().await;
    if let Err(e) = bot_handle.await {
        error!("Bot update loop panicked: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

/// Initializes the logging subsystem.
///
/// `RUST_LOG` takes precedence over `level`. Production logs are JSON lines.
fn init_logging(level: &str, json: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

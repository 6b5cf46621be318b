//! Polymarket Stop-Loss Bot
//!
//! Watches the funder wallet's largest position and market-sells it once the
//! loss from entry reaches the configured threshold.
//! Features:
//! - Polling monitor with network backoff and operator alerts
//! - CLOB market sells with signature-mode escalation
//! - Telegram notifications and Turso trade history

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stoploss_api::{DataApiClient, Notifier, TelegramNotifier, TradeLedger, TursoLedger};
use stoploss_chain::ClobClient;
use stoploss_core::config::{env, LoggingConfig, TursoCredentials};
use stoploss_core::{BotConfig, Credentials, Liquidator, Monitor, NotificationSink, TradeJournal};

/// Polymarket stop-loss bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor positions and enforce the stop-loss (default)
    Run,
    /// Print recent trade history, newest first
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let (config, source) = BotConfig::load(args.config.as_deref())?;
    // Flushes buffered file output when dropped, so it lives until the command returns
    let _log_guard = init_tracing(&config.logging)?;
    source.log();

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::History { limit } => history(limit).await,
    }
}

/// Console plus an optional size-rotated file. The returned guard flushes the file writer.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},reqwest=warn", logging.level)));

    let (file_layer, guard) = match logging.log_file() {
        Some(path) => {
            let writer = rotating_file(Path::new(path), logging.max_bytes(), logging.backup_count)?;
            let (writer, guard) = tracing_appender::non_blocking(writer);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

/// Log file rotated at `max_bytes`, keeping `backups` older files as `<path>.1` .. `<path>.N`.
fn rotating_file(path: &Path, max_bytes: usize, backups: usize) -> Result<FileRotate<AppendCount>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {:?}", parent))?;
    }
    Ok(FileRotate::new(
        path,
        AppendCount::new(backups),
        ContentLimit::Bytes(max_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

async fn run(config: BotConfig) -> Result<()> {
    print_banner();
    config.log_config();

    let credentials = Credentials::from_env()?;

    let source = DataApiClient::new(credentials.funder.to_string(), config.stop_loss.min_position_size)
        .with_timeout(config.monitoring.request_timeout());

    let clob = ClobClient::new(&credentials.private_key, credentials.funder, config.trading.chain_id)?
        .with_host(config.trading.clob_host.clone());
    info!(signer = %clob.address(), funder = %clob.funder(), "Trading client initialized");

    let liquidator = Liquidator::new(Arc::new(clob)).with_start_mode(config.trading.signature_type);

    let notifier = credentials.telegram.as_ref().map(|t| {
        Arc::new(TelegramNotifier::new(t.bot_token.clone(), t.chat_id)) as Arc<dyn Notifier>
    });
    if notifier.is_none() {
        warn!("Telegram not configured, notifications disabled");
    }
    let sink = NotificationSink::new(notifier, config.telegram.clone());

    let journal = TradeJournal::new(credentials.turso.as_ref().map(ledger));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for interrupt, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut monitor = Monitor::new(Arc::new(source), liquidator, sink, journal, &config);
    monitor.run(shutdown_rx).await
}

fn ledger(turso: &TursoCredentials) -> Arc<dyn TradeLedger> {
    let ledger = TursoLedger::new(&turso.database_url, turso.auth_token.clone());
    info!(url = %ledger.url(), "Trade ledger configured");
    Arc::new(ledger)
}

async fn history(limit: usize) -> Result<()> {
    let Some(turso) = TursoCredentials::from_env() else {
        anyhow::bail!(
            "Trade history needs {} and {}",
            env::TURSO_DATABASE_URL,
            env::TURSO_AUTH_TOKEN
        );
    };

    let journal = TradeJournal::new(Some(ledger(&turso)));
    let trades = journal.recent(limit).await?;
    if trades.is_empty() {
        println!("No trades recorded.");
        return Ok(());
    }

    for trade in trades {
        println!(
            "{} | {} | {} | {} | entry {:.4} -> exit {:.4} | {:.2} shares | -{:.2}% | {}",
            trade.timestamp.as_deref().unwrap_or("-"),
            trade.status.as_deref().unwrap_or("-"),
            trade.market_title.as_deref().unwrap_or("Unknown"),
            trade.outcome.as_deref().unwrap_or("-"),
            trade.entry_price.unwrap_or_default(),
            trade.exit_price.unwrap_or_default(),
            trade.shares.unwrap_or_default(),
            trade.loss_percentage.unwrap_or_default(),
            trade.order_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ╔═╗┌┬┐┌─┐┌─┐  ╦  ┌─┐┌─┐┌─┐
    ╚═╗ │ │ │├─┘  ║  │ │└─┐└─┐
    ╚═╝ ┴ └─┘┴    ╩═╝└─┘└─┘└─┘
    Polymarket Stop-Loss Bot v0.1.0
    "#);
}

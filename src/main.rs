mod alerts;
mod config;
mod error;
mod services;
mod sources;
mod types;

use alerts::{Alerter, ConsoleAlerter, TelegramAlerter};
use clap::{Parser, Subcommand};
use config::Config;
use error::{Result, ScanError};
use services::{Scanner, Store, TradeMonitor};
use sources::SourceRegistry;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use types::Command;

#[derive(Parser)]
#[command(name = "prowl")]
#[command(about = "Pre-pump accumulation scanner for crypto perpetual futures", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scanner
    Run {
        /// Single scan cycle, then exit
        #[arg(long)]
        once: bool,
        /// Print store statistics and exit
        #[arg(long)]
        stats: bool,
        /// Delete data older than the retention window and exit
        #[arg(long)]
        cleanup: bool,
    },
    /// Write a starter config file
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prowl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            let code: u8 = match e {
                ScanError::Config(_) => 1,
                ScanError::StoreCorruption(_) => 3,
                ScanError::TransientFetch(_) | ScanError::PermanentFetch(_) => 2,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup => {
            Config::write_default(&cli.config)?;
            println!("wrote starter config to {}", cli.config);
            Ok(())
        }
        Commands::Run { once, stats, cleanup } => {
            let config = Config::load(&cli.config)?;
            let store = Arc::new(Store::open(&config.store.path)?);

            if stats {
                let s = store.stats()?;
                println!("series rows:      {}", s.series_rows);
                println!("scan results:     {}", s.scan_results);
                println!("active trades:    {}", s.active_trades);
                println!("closed trades:    {}", s.closed_trades);
                println!("universe symbols: {}", s.universe_symbols);
                println!("file size:        {:.1} MB", s.file_size_bytes as f64 / 1e6);
                return Ok(());
            }
            if cleanup {
                let now = chrono::Utc::now().timestamp_millis();
                let removed = store.cleanup(config.store.retention_days, now)?;
                println!("removed {} rows older than {} days", removed, config.store.retention_days);
                return Ok(());
            }

            let sources = Arc::new(SourceRegistry::from_config(&config)?);
            let (alerters, telegram) = build_alerters(&config)?;

            let scanner = Scanner::new(config.clone(), store.clone(), sources.clone(), alerters.clone());
            let monitor = TradeMonitor::new(
                store.clone(),
                sources,
                alerters.clone(),
                config.risk.clone(),
                config.thresholds.watchlist,
            );

            if once {
                let summary = scanner.clone().run_cycle().await?;
                monitor.tick().await;
                println!(
                    "scanned {} symbols, {} alerts, {} errors in {:.1}s",
                    summary.scanned,
                    summary.alerted,
                    summary.errors,
                    summary.duration.as_secs_f64()
                );
                return Ok(());
            }

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            if let Some(telegram) = telegram {
                tokio::spawn(telegram.run_command_loop(command_tx));
            }
            supervise(config, scanner, monitor, alerters, command_rx).await
        }
    }
}

/// Build the configured sinks. Returns the Telegram sink separately so its
/// command loop can be spawned.
fn build_alerters(
    config: &Config,
) -> Result<(Vec<Arc<dyn Alerter>>, Option<Arc<TelegramAlerter>>)> {
    let mut alerters: Vec<Arc<dyn Alerter>> = Vec::new();
    let mut telegram = None;
    for sink in &config.alerts.sinks {
        match sink.as_str() {
            "console" => alerters.push(Arc::new(ConsoleAlerter)),
            "telegram" => {
                let tg_config = config.alerts.telegram.as_ref().ok_or_else(|| {
                    ScanError::Config("telegram sink enabled without alerts.telegram".into())
                })?;
                let client = reqwest::Client::builder()
                    .user_agent(concat!("prowl/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| ScanError::Internal(e.to_string()))?;
                let sink = TelegramAlerter::new(client, tg_config);
                telegram = Some(sink.clone());
                alerters.push(sink);
            }
            other => {
                return Err(ScanError::Config(format!("unknown alert sink: {}", other)));
            }
        }
    }
    if alerters.is_empty() {
        alerters.push(Arc::new(ConsoleAlerter));
    }
    Ok((alerters, telegram))
}

/// Supervisor: drives the scan cadence, the 5-minute trade tick, and the
/// command surface. Only fatal errors (store corruption) end the loop.
async fn supervise(
    config: Config,
    scanner: Arc<Scanner>,
    monitor: Arc<TradeMonitor>,
    alerters: Vec<Arc<dyn Alerter>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> Result<()> {
    let mut scan_tick = tokio::time::interval(Duration::from_secs(config.scan.cadence_seconds));
    scan_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut monitor_tick = tokio::time::interval(Duration::from_secs(300));
    monitor_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        cadence_s = config.scan.cadence_seconds,
        concurrency = config.scan.concurrency,
        "continuous mode started"
    );
    loop {
        tokio::select! {
            _ = scan_tick.tick() => {
                if let Err(e) = scanner.clone().run_cycle().await {
                    if e.is_fatal() {
                        for alerter in &alerters {
                            let _ = alerter.send_operator(&format!("halting: {}", e)).await;
                        }
                        return Err(e);
                    }
                    warn!("cycle failed: {}", e);
                }
            }
            _ = monitor_tick.tick() => monitor.tick().await,
            Some(command) = commands.recv() => {
                if let Err(e) = handle_command(command, &config, &scanner, &monitor, &alerters).await {
                    if e.is_fatal() {
                        return Err(e);
                    }
                    for alerter in &alerters {
                        let _ = alerter.send_text(&format!("⚠ {}", e)).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                return Ok(());
            }
        }
    }
}

async fn handle_command(
    command: Command,
    config: &Config,
    scanner: &Arc<Scanner>,
    monitor: &Arc<TradeMonitor>,
    alerters: &[Arc<dyn Alerter>],
) -> Result<()> {
    match command {
        Command::Trade { symbol, entry, size_usd, stop_pct } => {
            monitor.register(&symbol, entry, size_usd, stop_pct).await
        }
        Command::Close { symbol } => {
            if monitor.close(&symbol).await?.is_none() {
                for alerter in alerters {
                    let _ = alerter
                        .send_text(&format!("no active trade for {}", symbol))
                        .await;
                }
            }
            Ok(())
        }
        Command::Status => {
            let count = monitor.send_status().await?;
            if count == 0 {
                for alerter in alerters {
                    let _ = alerter.send_text("no open trades").await;
                }
            }
            Ok(())
        }
        Command::Adjust { symbol, field, value } => monitor.adjust(&symbol, field, value).await,
        Command::Scan => {
            let summary = scanner.clone().run_cycle().await?;
            for alerter in alerters {
                let _ = alerter
                    .send_text(&format!(
                        "scan done: {} symbols, {} alerts",
                        summary.scanned, summary.alerted
                    ))
                    .await;
            }
            Ok(())
        }
        Command::Watchlist => {
            let top = scanner
                .store()
                .top_scores(config.thresholds.watchlist, 15)?;
            let mut lines = vec!["watchlist:".to_string()];
            for result in top {
                lines.push(format!(
                    "  {:10} {:5.1} {}",
                    result.symbol,
                    result.final_score,
                    result.classification.as_str()
                ));
            }
            let text = lines.join("\n");
            for alerter in alerters {
                let _ = alerter.send_text(&text).await;
            }
            Ok(())
        }
    }
}

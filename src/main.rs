//! Fear & Greed ladder
//!
//! Simulates a virtual BTC/ETH portfolio that accumulates in fear and
//! distributes in greed along a tiered ladder, one scheduled run at a time.

mod api;
mod config;
mod db;
mod error;
mod metrics;
mod models;
mod notify;
mod reports;
mod runner;
mod trading;

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{Asset, TradeSide};
use crate::notify::{fmt_qty, fmt_usd};
use crate::reports::{ReportOutcome, Reporter};
use crate::runner::Runner;
use crate::trading::{Ladder, LadderEngine, StrategyConfig};

/// Fear & Greed ladder CLI.
#[derive(Parser)]
#[command(name = "fng-ladder")]
#[command(about = "Sentiment-driven BTC/ETH ladder simulator", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(short, long, env = "FNG_DATABASE_URL", default_value = "sqlite:./fng_ladder.db?mode=rwc")]
    database: String,

    /// Strategy JSON file (defaults to the built-in ladder)
    #[arg(short, long, env = "FNG_STRATEGY")]
    strategy: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one scheduled run: fetch, evaluate, persist, notify
    Run,

    /// Show the stored portfolio, buckets, and tier flags
    Status,

    /// Show the effective strategy ladder
    Config,

    /// Show the most recent ledger rows
    Ledger {
        /// Number of rows to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Send a periodic report
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Import a legacy or versioned JSON state file
    ImportState {
        /// Path to the state document
        path: PathBuf,

        /// Replace an existing portfolio record
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Previous calendar month
    Monthly,
    /// Previous calendar year
    Yearly,
    /// Quiet-week notice (sent only when the ledger has gone silent)
    Inactivity,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG, when set, refines the flag
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let strategy = match &cli.strategy {
        Some(path) => StrategyConfig::from_file(path)?,
        None => StrategyConfig::default(),
    };
    let engine = LadderEngine::new(strategy)?;

    match cli.command {
        Commands::Run => {
            // Credentials are checked before anything is contacted
            let app = AppConfig::from_env()?;
            let db = Database::new(&cli.database).await?;
            let runner = Runner::new(engine, db, &app)?;

            let outcome = runner.run_once().await?;

            println!(
                "\n=== Run {} at {} ===",
                outcome.run_id,
                outcome.executed_at.format("%Y-%m-%d %H:%M UTC")
            );
            println!(
                "Sentiment: {} (published {})",
                outcome.snapshot.sentiment,
                outcome.snapshot.sentiment_at.format("%Y-%m-%d %H:%M UTC")
            );
            println!(
                "Prices:    BTC {} $ | ETH {} $",
                fmt_usd(outcome.snapshot.prices.btc),
                fmt_usd(outcome.snapshot.prices.eth)
            );
            if outcome.recovered_empty {
                println!("Empty portfolio: tier flags were reset");
            }
            if outcome.cycle_completed {
                println!("Cycle completed: all tiers re-armed");
            }

            if outcome.actions.is_empty() {
                println!("No tier triggered.");
            } else {
                println!(
                    "\n{:<5} {:>4} {:<4} {:>12} {:>14} {:>12}",
                    "SIDE", "TIER", "ASSET", "USD", "QTY", "PRICE"
                );
                println!("{}", "-".repeat(56));
                for action in &outcome.actions {
                    println!(
                        "{:<5} {:>4} {:<4} {:>12} {:>14} {:>12}",
                        action.side.as_str(),
                        action.tier.level(),
                        action.asset.symbol(),
                        fmt_usd(action.usd_amount),
                        fmt_qty(action.quantity),
                        fmt_usd(action.price)
                    );
                }
            }
            println!("\nCash after run: {} $", fmt_usd(outcome.state.cash));

            if let Some(message_id) = outcome.message_id {
                println!("Summary sent (message {}).", message_id);
            }
            if let Some(err) = &outcome.notification_error {
                // State and ledger are saved; delivery failures do not fail the run
                warn!(error = %err, "Run finished without notification");
            }
        }

        Commands::Status => {
            let db = Database::new(&cli.database).await?;
            let stored = db.stored_state(&engine).await?;
            let state = match stored {
                Some(state) => state,
                None => {
                    println!("No stored portfolio yet; the next run starts from the bootstrap state.\n");
                    engine.bootstrap_state()
                }
            };

            println!("=== Virtual Portfolio ===");
            println!("Base capital:  {} $", fmt_usd(state.base_capital));
            println!("Cash:          {} $", fmt_usd(state.cash));
            for asset in Asset::ALL {
                let avg = state
                    .avg_entry
                    .get(asset)
                    .map(|p| format!("{} $", fmt_usd(p)))
                    .unwrap_or_else(|| "—".to_string());
                println!(
                    "{:<4}           {} (avg entry {})",
                    asset.symbol(),
                    fmt_qty(*state.holdings.get(asset)),
                    avg
                );
            }
            println!("Invested:      {} $", fmt_usd(state.total_invested()));
            println!("Phase:         {:?}", state.phase());

            if !state.buckets.is_empty() {
                println!("\n--- Buckets ---");
                println!("{:>4} {:>12} {:>14} {:>14}", "TIER", "INVESTED", "BTC", "ETH");
                for (tier, bucket) in state.buckets.iter().rev() {
                    println!(
                        "{:>4} {:>12} {:>14} {:>14}",
                        tier.level(),
                        fmt_usd(bucket.invested_usd),
                        fmt_qty(bucket.holdings.btc),
                        fmt_qty(bucket.holdings.eth)
                    );
                }
            }

            println!("\n--- Tier Flags ---");
            let fired = |flags: &std::collections::BTreeMap<_, bool>| {
                flags
                    .iter()
                    .map(|(tier, used)| format!("{}{}", tier, if *used { "*" } else { "" }))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            println!("Sell tiers: {}", fired(&state.sell_fired));
            if !state.buy_fired.is_empty() {
                println!("Buy tiers:  {}", fired(&state.buy_fired));
            }
            println!("(* = fired this cycle)");

            let trades = db.trade_count().await?;
            let last = db.last_trade_at().await?;
            println!(
                "\nLedger: {} rows, last trade {}",
                trades,
                last.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
        }

        Commands::Config => {
            let strategy = engine.config();

            println!("\n=== Strategy Configuration ===");
            println!("Base capital:   {} $", fmt_usd(strategy.base_capital));
            println!("Rounding step:  {} $", fmt_usd(strategy.rounding_step));
            println!("Ladder mode:    {}", strategy.ladder.mode_name());
            println!("Sell band:      {:?}", strategy.sell_band);
            println!(
                "Full exit:      {}",
                strategy
                    .full_exit
                    .map(|t| format!("F&G >= {}", t))
                    .unwrap_or_else(|| "disabled".to_string())
            );
            println!("Restore cash:   {}", strategy.restore_base_cash_on_reset);

            println!("\n--- Buy Tiers ---");
            match &strategy.ladder {
                Ladder::Bucketed { buy, .. } => {
                    for tier in buy {
                        println!("  F&G <= {:>3}  target {} $", tier.level, fmt_usd(tier.target_usd));
                    }
                }
                Ladder::PositionFraction { buy, .. } => {
                    for tier in buy {
                        println!("  F&G <= {:>3}  spend {} of cash", tier.level, tier.cash_fraction);
                    }
                }
            }

            println!("\n--- Sell Tiers ---");
            for tier in strategy.ladder.sell_tiers() {
                println!("  F&G >= {:>3}  release {}", tier.level, tier.fraction);
            }

            println!("\n--- Environment ---");
            for key in [
                config::CMC_API_KEY,
                config::TELEGRAM_BOT_TOKEN,
                config::TELEGRAM_CHAT_ID,
            ] {
                let set = std::env::var(key).map(|v| !v.trim().is_empty()).unwrap_or(false);
                println!("  {:<20} {}", key, if set { "set" } else { "missing" });
            }
        }

        Commands::Ledger { limit } => {
            let db = Database::new(&cli.database).await?;
            let rows = db.recent_trades(limit).await?;

            if rows.is_empty() {
                println!("Ledger is empty. Trades appear here after 'fng-ladder run' fires a tier.");
                return Ok(());
            }

            println!(
                "\n{:<17} {:<4} {:<5} {:>4} {:>3} {:>12} {:>12} {:>14} {:>10}",
                "TIME", "ASSET", "SIDE", "TIER", "F&G", "PRICE", "USD", "DELTA", "PNL"
            );
            println!("{}", "-".repeat(90));
            for row in rows {
                println!(
                    "{:<17} {:<4} {:<5} {:>4} {:>3} {:>12} {:>12} {:>14} {:>10}",
                    row.executed_at.format("%Y-%m-%d %H:%M"),
                    row.asset.symbol(),
                    row.side.as_str(),
                    row.tier.level(),
                    row.sentiment.value(),
                    fmt_usd(row.price),
                    fmt_usd(row.usd_amount),
                    fmt_qty(row.asset_delta),
                    match (row.side, row.realized_pnl) {
                        (TradeSide::Sell, Some(pnl)) => fmt_usd(pnl),
                        _ => "-".to_string(),
                    }
                );
            }
        }

        Commands::Report { kind } => {
            let app = AppConfig::from_env()?;
            let db = Database::new(&cli.database).await?;
            let reporter = Reporter::new(engine, db, &app)?;

            let now = Utc::now();
            let outcome = match kind {
                ReportKind::Monthly => reporter.monthly(now.date_naive()).await?,
                ReportKind::Yearly => reporter.yearly(now.date_naive()).await?,
                ReportKind::Inactivity => reporter.inactivity(now).await?,
            };

            match outcome {
                ReportOutcome::Sent { message_id } => {
                    info!(message_id, "Report delivered");
                    println!("Report sent (message {}).", message_id);
                }
                ReportOutcome::Skipped(reason) => println!("Report skipped: {}.", reason),
            }
        }

        Commands::ImportState { path, force } => {
            let db = Database::new(&cli.database).await?;
            let state = db.import_state_file(&path, &engine, force).await?;

            println!("Imported {}", path.display());
            println!("Cash: {} $", fmt_usd(state.cash));
            for asset in Asset::ALL {
                println!("{}:  {}", asset, fmt_qty(*state.holdings.get(asset)));
            }
        }
    }

    Ok(())
}

//! sms-rs CLI: run a synthetic market session from the terminal.
//!
//! Prints either one JSON object per update or a summary at the end of the session.

use std::{path::PathBuf, thread};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use sms_rs::metrics::Metrics;
use sms_rs::{
    config::{MarketConfig, Tier},
    engine::{Market, MarketView, PatternKind, Position, TickOutcome},
};

#[derive(Parser)]
#[command(name = "sms-rs", about = "Synthetic market simulator: candles, chart patterns and paper positions")]
struct Cli {
    /// Volatility tier: low, medium, high or ultra.
    #[arg(long, default_value = "low")]
    tier: Tier,

    /// Number of timer ticks to run.
    #[arg(long, default_value_t = 500)]
    ticks: usize,

    /// Milliseconds between ticks. Defaults to the configured interval.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Seed of the random source, for reproducible sessions.
    #[arg(long)]
    seed: Option<u64>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Summary)]
    format: Format,

    /// Open a position when the market opens.
    #[arg(long, value_enum)]
    position: Option<Side>,

    /// Take-profit level of the opened position.
    #[arg(long, requires = "position")]
    take_profit: Option<f64>,

    /// Stop-loss level of the opened position.
    #[arg(long, requires = "position")]
    stop_loss: Option<f64>,

    /// Queue a chart pattern (doubleTop, doubleBottom, headShoulders, triangle, flag, wedge).
    #[arg(long)]
    pattern: Option<PatternKind>,

    /// Apply a manual move every N ticks.
    #[arg(long, requires = "pump")]
    pump_every: Option<usize>,

    /// Size of the manual move: positive pumps, negative dumps.
    #[arg(long, allow_negative_numbers = true)]
    pump: Option<f64>,

    /// Log filter, overridden by RUST_LOG.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Session summary on exit.
    Summary,
    /// One JSON object per update.
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Side {
    Buy,
    Sell,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let mut config = match &cli.config {
        Some(path) => MarketConfig::from_file(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => MarketConfig::default(),
    };
    if let Some(interval_ms) = cli.interval_ms {
        config.tick_interval_ms = interval_ms;
    }

    let mut market = Market::new(config, cli.tier, cli.seed)?;
    if cli.format == Format::Json {
        market.add_listener(print_update);
    }
    market.start();

    if let Some(kind) = cli.pattern {
        market.schedule_pattern(kind);
    }
    let position = match cli.position {
        Some(Side::Buy) => Some(market.place_buy(cli.take_profit, cli.stop_loss)?),
        Some(Side::Sell) => Some(market.place_sell(cli.take_profit, cli.stop_loss)?),
        None => None,
    };

    let interval = market.interval();
    let mut candles = 0;
    let mut patterns = 0;
    for tick in 1..=cli.ticks {
        match market.on_timer()? {
            TickOutcome::Candle(_) => candles += 1,
            TickOutcome::PatternStarted(kind) => {
                patterns += 1;
                info!(%kind, tick, "pattern started");
            }
            TickOutcome::Closed => break,
        }

        if let (Some(every), Some(delta)) = (cli.pump_every, cli.pump)
            && every > 0
            && tick % every == 0
        {
            if delta >= 0.0 {
                market.pump(delta)?;
            } else {
                market.dump(delta)?;
            }
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    if let Some(id) = position
        && market.ledger().position(id).is_some_and(Position::is_open)
    {
        let profit = market.close_position(id)?;
        info!(id, profit, "position closed on exit");
    }
    market.stop();

    if cli.format == Format::Summary {
        print_summary(&market, candles, patterns);
    }

    Ok(())
}

/// Installs the global tracing subscriber on stderr, so stdout only carries the output.
fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()?;
    Ok(())
}

fn print_update(view: &MarketView<'_>) {
    let Some(candle) = view.last() else {
        return;
    };
    let update = json!({
        "candle": candle,
        "direction": view.direction(),
        "sessionHigh": view.session_high(),
        "sessionLow": view.session_low(),
        "balance": view.balance(),
        "totalBalance": view.total_balance(),
        "openPositions": view.positions().count(),
    });
    println!("{update}");
}

fn print_summary(market: &Market, candles: usize, patterns: usize) {
    let view = market.view();
    let ledger = market.ledger();

    println!("=== Market Session ===");
    println!("Tier: {}", market.tier());
    println!("Candles: {candles} (patterns started: {patterns})");
    if let Some(price) = view.last_price() {
        println!("Last Price: {price:.2} ({:?})", view.direction());
    }
    if let (Some(high), Some(low)) = (view.session_high(), view.session_low()) {
        println!("Session High/Low: {high:.2}/{low:.2}");
    }
    println!("Balance: {:.2} (initial {:.2})", ledger.balance(), ledger.initial_balance());

    for position in ledger.history() {
        println!(
            "#{} {:?} {:.2} -> {:.2} profit {:.2} ({:?})",
            position.id(),
            position.side(),
            position.entry_price(),
            position.exit_price().unwrap_or_default(),
            position.profit(),
            position.close_reason(),
        );
    }

    #[cfg(feature = "metrics")]
    println!("\n{}", Metrics::from(market));
}

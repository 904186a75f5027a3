//! # fbot
//!
//! Command-line front end for the futures bot: single orders against Binance
//! USDT-M futures plus OCO, TWAP and grid strategies driven by `fbot-algo`.
//!
//! # Usage
//!
//! ```bash
//! fbot --config config.json market BTCUSDT BUY 0.01
//! fbot oco BTCUSDT SELL 0.01 --tp-pct 2 --sl-pct 1
//! fbot twap BTCUSDT BUY 0.05 10 5 --log-level debug
//! fbot grid BTCUSDT 45000 55000 10 0.001
//! fbot limit BTCUSDT SELL 0.01 56000 --position-side SHORT
//! ```
//!
//! Credentials come from the config file or `BINANCE_API_KEY` /
//! `BINANCE_API_SECRET` (a `.env` file in the working directory is loaded).

mod commands;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use fbot_core::config::{EngineConfig, LogConfig, load_config};
use fbot_core::enums::{PositionSide, Side, TimeInForce};
use fbot_td::binance::BinanceFutures;
use fbot_td::binance::config::{API_KEY_ENV, API_SECRET_ENV, BinanceFuturesConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

/// Binance USDT-M futures order bot.
#[derive(Parser)]
#[command(name = "fbot", about = "Binance USDT-M futures order bot", version)]
struct Cli {
    /// Configuration file path (JSON). Built-in defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Optional log directory for file output.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    /// Position side for new orders: BOTH (one-way mode), LONG or SHORT (hedge mode).
    #[arg(long, global = true, default_value = "BOTH")]
    position_side: PositionSide,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a market order.
    Market { symbol: String, side: Side, quantity: Decimal },

    /// Place a limit order.
    Limit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        /// Time in force: GTC, IOC or FOK.
        #[arg(long, default_value = "GTC")]
        tif: TimeInForce,
    },

    /// Place a stop-limit order.
    StopLimit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    },

    /// Cancel an order.
    Cancel { symbol: String, order_id: u64 },

    /// Show an order's status and fills.
    Status { symbol: String, order_id: u64 },

    /// List open orders.
    OpenOrders { symbol: Option<String> },

    /// Replace a resting limit or stop-limit order with new parameters.
    Modify {
        symbol: String,
        order_id: u64,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        quantity: Option<Decimal>,
        #[arg(long)]
        stop_price: Option<Decimal>,
    },

    /// Place a take-profit / stop-loss pair and supervise it.
    Oco(OcoArgs),

    /// Execute a quantity in equal slices over a duration.
    Twap {
        symbol: String,
        side: Side,
        quantity: Decimal,
        /// Total duration in minutes.
        duration_min: u64,
        slices: u32,
        /// Place LIMIT slices at this price instead of MARKET.
        #[arg(long)]
        limit_price: Option<Decimal>,
    },

    /// Run a grid of limit orders between two prices.
    Grid {
        symbol: String,
        lower: Decimal,
        upper: Decimal,
        levels: u32,
        /// Quantity per grid order.
        quantity: Decimal,
    },
}

#[derive(Args)]
struct OcoArgs {
    symbol: String,
    /// Side of the closing orders (SELL protects a long).
    side: Side,
    quantity: Decimal,
    /// Take-profit limit price.
    #[arg(required_unless_present = "tp_pct")]
    take_profit: Option<Decimal>,
    /// Stop trigger price.
    #[arg(required_unless_present = "tp_pct")]
    stop: Option<Decimal>,
    /// Limit price of the triggered stop order.
    #[arg(required_unless_present = "tp_pct")]
    stop_limit: Option<Decimal>,
    /// Take-profit distance from the current price, in percent.
    #[arg(long, requires = "sl_pct", conflicts_with_all = ["take_profit", "stop", "stop_limit"])]
    tp_pct: Option<Decimal>,
    /// Stop-loss distance from the current price, in percent.
    #[arg(long, requires = "tp_pct")]
    sl_pct: Option<Decimal>,
    /// Place the pair and exit without supervising it.
    #[arg(long)]
    detach: bool,
}

/// Top-level config file.
#[derive(Debug, Default, Deserialize)]
struct RunnerConfig {
    #[serde(default)]
    binance: BinanceFuturesConfig,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    log: LogConfig,
}

impl RunnerConfig {
    /// Load the config file (or defaults) and apply environment credentials.
    fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        config.binance.apply_env();
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // 1. Load configuration
    let config = RunnerConfig::load(cli.config.as_deref())?;

    // 2. Initialize logging
    fbot_core::logging::init_from_config(&config.log, cli.log_level.as_deref(), cli.log_dir.as_deref());
    info!(
        "fbot starting — config={}, testnet={}",
        cli.config.as_deref().map_or_else(|| "<defaults>".into(), |p| p.display().to_string()),
        config.binance.testnet
    );

    // 3. Build the exchange client
    if !config.binance.has_credentials() {
        bail!("missing API credentials: set {API_KEY_ENV} and {API_SECRET_ENV} or the binance section of the config");
    }
    let exchange = Arc::new(BinanceFutures::new(&config.binance).context("failed to create Binance client")?);

    // 4. Run the command
    commands::run(cli.command, exchange, config.engine, cli.position_side).await
}

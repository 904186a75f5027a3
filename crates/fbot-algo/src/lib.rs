//! # fbot-algo
//!
//! Strategy engine for the futures bot:
//!
//! - **OCO** (`oco`): client-side take-profit / stop-loss pairs with sibling
//!   cancellation and race detection
//! - **TWAP** (`twap`): equal slices at a fixed interval
//! - **Grid** (`grid`): limit orders on evenly spaced levels, re-armed on fill
//! - **Controller** (`controller`): run registry, stop, status snapshots
//!
//! The engine talks to the exchange only through [`fbot_td::ExchangeClient`]
//! and reports every state change through an [`events::EventLogger`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fbot_algo::{StrategyController, TracingLogger, TwapSpec};
//! use fbot_core::config::EngineConfig;
//! use fbot_core::enums::Side;
//! use fbot_td::binance::BinanceFutures;
//! use fbot_td::binance::config::BinanceFuturesConfig;
//! use rust_decimal::Decimal;
//!
//! # async fn run(config: BinanceFuturesConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let exchange = Arc::new(BinanceFutures::new(&config)?);
//! let controller = StrategyController::new(exchange, Arc::new(TracingLogger), EngineConfig::default());
//! let spec = TwapSpec::new("BTCUSDT", Side::Buy, Decimal::new(1, 2), 3, Duration::from_secs(60));
//! let mut handle = controller.start_twap(spec).await?;
//! let run = handle.wait().await;
//! println!("{:?} filled {}", run.status, run.filled_quantity);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod events;
pub mod grid;
pub mod leg;
pub mod oco;
pub mod run;
pub mod twap;

#[cfg(test)]
mod sim;

pub use controller::StrategyController;
pub use error::{EngineError, EngineResult};
pub use events::{EngineEvent, EventLogger, TracingLogger};
pub use grid::GridSpec;
pub use leg::{LegId, OrderLeg};
pub use oco::{OcoCoordinator, OcoHandle, OcoOutcome, OcoPair, OcoPrices, OcoRequest};
pub use run::{GridLevel, RunHandle, RunId, StrategyRun};
pub use twap::TwapSpec;

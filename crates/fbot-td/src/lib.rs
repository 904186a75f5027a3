//! # fbot-td
//!
//! Trading (order execution) client for Binance USDT-margined futures.
//!
//! The strategy engine never talks HTTP directly: it consumes the
//! [`ExchangeClient`] trait, which exposes the four single-order primitives
//! every strategy is built from. [`binance::BinanceFutures`] is the production
//! implementation; tests substitute an in-memory exchange.
//!
//! | Operation          | Method | Path                    |
//! |--------------------|--------|-------------------------|
//! | Place order        | POST   | `/fapi/v1/order`        |
//! | Cancel order       | DELETE | `/fapi/v1/order`        |
//! | Query order        | GET    | `/fapi/v1/order`        |
//! | Open orders        | GET    | `/fapi/v1/openOrders`   |
//! | Last price         | GET    | `/fapi/v1/ticker/price` |

pub mod binance;

use async_trait::async_trait;
use fbot_core::error::ExchangeError;
use fbot_core::trading::{OrderReport, OrderRequest, PlacedOrder};
use fbot_core::enums::OrderStatus;
use rust_decimal::Decimal;

/// Result alias for exchange calls.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Order primitives consumed by the strategy engine.
///
/// Each call is awaited to completion before the caller issues the next one,
/// so from a strategy's point of view the exchange is synchronous. Methods take
/// `&self` so one client can serve many concurrent runs.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a new order.
    ///
    /// Fails with [`ExchangeError::Rejected`] when the exchange refuses the
    /// order and [`ExchangeError::Network`] when the outcome is unknown.
    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<PlacedOrder>;

    /// Cancel an open order.
    ///
    /// Fails with [`ExchangeError::OrderNotFound`] if the order is already
    /// terminal.
    async fn cancel_order(&self, symbol: &str, exchange_order_id: u64) -> ExchangeResult<OrderStatus>;

    /// Query the current status and cumulative fills of an order.
    async fn get_order_status(&self, symbol: &str, exchange_order_id: u64) -> ExchangeResult<OrderReport>;

    /// Latest traded price for a symbol.
    async fn get_current_price(&self, symbol: &str) -> ExchangeResult<Decimal>;
}

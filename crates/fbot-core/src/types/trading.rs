//! Trading-related data structures: order requests and exchange reports.
//!
//! These types flow between the strategy engine and the trading client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, OrderType, PositionSide, Side, TimeInForce};

// ---------------------------------------------------------------------------
// Order request (engine → trading client)
// ---------------------------------------------------------------------------

/// A single order to submit to the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Exchange symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Market, limit or stop-limit.
    pub order_type: OrderType,
    /// Order quantity in base asset units.
    pub quantity: Decimal,
    /// Limit price; `None` for market orders.
    pub price: Option<Decimal>,
    /// Stop trigger price; only for stop-limit orders.
    pub stop_price: Option<Decimal>,
    /// Time in force for priced orders.
    #[serde(default)]
    pub time_in_force: TimeInForce,
    /// Hedge-mode position; `Both` in one-way mode.
    #[serde(default)]
    pub position_side: PositionSide,
    /// Client-assigned order ID sent as `newClientOrderId`.
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::Gtc,
            position_side: PositionSide::Both,
            client_order_id: None,
        }
    }

    pub fn limit(symbol: &str, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop_limit(
        symbol: &str,
        side: Side,
        quantity: Decimal,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            price: Some(limit_price),
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = position_side;
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Exchange responses (trading client → engine)
// ---------------------------------------------------------------------------

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    /// Exchange-assigned order ID.
    pub exchange_order_id: u64,
    /// Status reported in the placement response.
    pub status: OrderStatus,
}

/// Point-in-time fill report for an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderReport {
    /// Current order status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price (zero when nothing has filled).
    pub avg_price: Decimal,
}

/// An open order as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub exchange_order_id: u64,
    pub client_order_id: String,
    pub side: Side,
    /// Raw Binance order type (e.g. `LIMIT`, `STOP`).
    pub order_type: String,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub position_side: PositionSide,
    pub price: Decimal,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Last update time (ms since epoch).
    pub update_time: u64,
}

//! Binance futures trading module.
//!
//! Implements [`ExchangeClient`](crate::ExchangeClient) for USDT-margined
//! futures on top of the REST transport in [`futures`].
//!
//! # Architecture
//!
//! ```text
//! BinanceFutures
//! ├── FuturesClient   (signed REST transport, error classification)
//! └── JSON → typed    (PlacedOrder / OrderReport / OpenOrder helpers)
//! ```
//!
//! All methods take `&self` and are safe to call from multiple strategy tasks
//! concurrently.

pub mod auth;
pub mod config;
pub mod futures;

use async_trait::async_trait;
use fbot_core::enums::{OrderStatus, OrderType, PositionSide, Side, TimeInForce};
use fbot_core::error::ExchangeError;
use fbot_core::trading::{OpenOrder, OrderReport, OrderRequest, PlacedOrder};
use rust_decimal::Decimal;
use tracing::{info, warn};

use self::config::BinanceFuturesConfig;
use self::futures::FuturesClient;
use crate::{ExchangeClient, ExchangeResult};

/// Binance USDT-margined futures trading client.
pub struct BinanceFutures {
    client: FuturesClient,
    testnet: bool,
}

impl BinanceFutures {
    /// Create a client from configuration. No request is sent until the
    /// first order operation.
    pub fn new(config: &BinanceFuturesConfig) -> ExchangeResult<Self> {
        let client = FuturesClient::new(config)?;
        info!("[binance-td] client ready — url={}, testnet={}", config.base_url(), config.testnet);
        Ok(Self {
            client,
            testnet: config.testnet,
        })
    }

    pub fn is_testnet(&self) -> bool {
        self.testnet
    }

    /// List open orders, optionally for one symbol.
    pub async fn open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<OpenOrder>> {
        let val = self.client.open_orders(symbol).await?;
        let orders = val
            .as_array()
            .ok_or_else(|| ExchangeError::Decode("openOrders: expected array".into()))?
            .iter()
            .filter_map(parse_open_order)
            .collect::<Vec<_>>();
        info!("[binance-td] {} open order(s) for {}", orders.len(), symbol.unwrap_or("all symbols"));
        Ok(orders)
    }

    /// Fetch a single order with its original parameters.
    pub async fn order_details(&self, symbol: &str, exchange_order_id: u64) -> ExchangeResult<OpenOrder> {
        let val = self.client.query_order(symbol, exchange_order_id).await?;
        parse_open_order(&val).ok_or_else(|| ExchangeError::Decode(format!("order {exchange_order_id}: missing fields")))
    }

    /// Modify a resting LIMIT or STOP order by cancelling it and placing a
    /// replacement with the same side, type, time in force and position side.
    ///
    /// Fields left as `None` keep their original value. The replacement gets a
    /// new exchange order ID.
    pub async fn replace_order(
        &self,
        symbol: &str,
        exchange_order_id: u64,
        new_price: Option<Decimal>,
        new_quantity: Option<Decimal>,
        new_stop_price: Option<Decimal>,
    ) -> ExchangeResult<PlacedOrder> {
        let current = self.order_details(symbol, exchange_order_id).await?;
        let order_type = match current.order_type.as_str() {
            "LIMIT" => OrderType::Limit,
            "STOP" => OrderType::StopLimit,
            other => {
                return Err(ExchangeError::Unsupported(format!(
                    "cannot modify {other} order {exchange_order_id}"
                )));
            }
        };
        let quantity = new_quantity.unwrap_or(current.quantity);
        let price = new_price.unwrap_or(current.price);

        self.cancel_order(symbol, exchange_order_id).await?;
        info!("[binance-td] order {exchange_order_id} cancelled for replacement");

        let request = match order_type {
            OrderType::StopLimit => {
                let stop = new_stop_price.unwrap_or(current.stop_price);
                OrderRequest::stop_limit(symbol, current.side, quantity, stop, price)
            }
            _ => OrderRequest::limit(symbol, current.side, quantity, price),
        };
        let request = request
            .with_time_in_force(current.time_in_force)
            .with_position_side(current.position_side);

        self.place_order(&request).await
    }
}

#[async_trait]
impl ExchangeClient for BinanceFutures {
    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<PlacedOrder> {
        let params = order_params(order);
        let resp = match self.client.new_order(&params).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    "[binance-td] order failed: {} {} {} qty={} — {e}",
                    order.symbol, order.side, order.order_type, order.quantity,
                );
                return Err(e);
            }
        };

        let placed = parse_placed_order(&resp)?;
        info!(
            "[binance-td] order placed: {} {} {} qty={} price={} → id={} status={:?}",
            order.symbol,
            order.side,
            order.order_type,
            order.quantity,
            order.price.map(|p| p.to_string()).unwrap_or_else(|| "MKT".into()),
            placed.exchange_order_id,
            placed.status,
        );
        Ok(placed)
    }

    async fn cancel_order(&self, symbol: &str, exchange_order_id: u64) -> ExchangeResult<OrderStatus> {
        let resp = self.client.cancel_order(symbol, exchange_order_id).await?;
        let status = resp
            .get("status")
            .and_then(|s| s.as_str())
            .map(parse_order_status)
            .unwrap_or(OrderStatus::Canceled);
        info!("[binance-td] order cancelled: {symbol} id={exchange_order_id} status={status:?}");
        Ok(status)
    }

    async fn get_order_status(&self, symbol: &str, exchange_order_id: u64) -> ExchangeResult<OrderReport> {
        let resp = self.client.query_order(symbol, exchange_order_id).await?;
        parse_order_report(&resp)
    }

    async fn get_current_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let resp = self.client.ticker_price(symbol).await?;
        decimal_field(&resp, "price").ok_or_else(|| ExchangeError::Decode(format!("ticker {symbol}: missing price")))
    }
}

// ---------------------------------------------------------------------------
// Typed → query parameters
// ---------------------------------------------------------------------------

/// Build the `POST /fapi/v1/order` parameter list for a request.
fn order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", order.symbol.clone()),
        ("side", order.side.as_str().to_string()),
        ("type", order.order_type.as_binance().to_string()),
        ("quantity", order.quantity.normalize().to_string()),
    ];
    if order.order_type.is_priced() {
        if let Some(price) = order.price {
            params.push(("price", price.normalize().to_string()));
        }
        params.push(("timeInForce", order.time_in_force.as_str().to_string()));
    }
    if let Some(stop) = order.stop_price {
        params.push(("stopPrice", stop.normalize().to_string()));
    }
    // BOTH is the one-way default; hedge-mode accounts need LONG or SHORT.
    if order.position_side != PositionSide::Both {
        params.push(("positionSide", order.position_side.as_str().to_string()));
    }
    if let Some(ref cid) = order.client_order_id {
        params.push(("newClientOrderId", cid.clone()));
    }
    params.push(("newOrderRespType", "RESULT".to_string()));
    params
}

// ---------------------------------------------------------------------------
// JSON → typed helpers
// ---------------------------------------------------------------------------

/// Read a Binance decimal field, which is encoded as a JSON string.
fn decimal_field(v: &serde_json::Value, key: &str) -> Option<Decimal> {
    match v.get(key)? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn parse_placed_order(v: &serde_json::Value) -> ExchangeResult<PlacedOrder> {
    let exchange_order_id = v
        .get("orderId")
        .and_then(|id| id.as_u64())
        .ok_or_else(|| ExchangeError::Decode("new order: missing orderId".into()))?;
    let status = v.get("status").and_then(|s| s.as_str()).map(parse_order_status).unwrap_or(OrderStatus::New);
    Ok(PlacedOrder {
        exchange_order_id,
        status,
    })
}

fn parse_order_report(v: &serde_json::Value) -> ExchangeResult<OrderReport> {
    let status = v
        .get("status")
        .and_then(|s| s.as_str())
        .map(parse_order_status)
        .ok_or_else(|| ExchangeError::Decode("order: missing status".into()))?;
    Ok(OrderReport {
        status,
        filled_quantity: decimal_field(v, "executedQty").unwrap_or_default(),
        avg_price: decimal_field(v, "avgPrice").unwrap_or_default(),
    })
}

/// Parse a Binance order JSON object into an [`OpenOrder`].
fn parse_open_order(v: &serde_json::Value) -> Option<OpenOrder> {
    Some(OpenOrder {
        symbol: v.get("symbol")?.as_str()?.to_string(),
        exchange_order_id: v.get("orderId")?.as_u64()?,
        client_order_id: v.get("clientOrderId").and_then(|c| c.as_str()).unwrap_or_default().to_string(),
        side: v.get("side")?.as_str()?.parse::<Side>().ok()?,
        order_type: v.get("type")?.as_str()?.to_string(),
        status: parse_order_status(v.get("status")?.as_str()?),
        time_in_force: v
            .get("timeInForce")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse::<TimeInForce>().ok())
            .unwrap_or_default(),
        position_side: v
            .get("positionSide")
            .and_then(|p| p.as_str())
            .and_then(|p| p.parse::<PositionSide>().ok())
            .unwrap_or_default(),
        price: decimal_field(v, "price").unwrap_or_default(),
        stop_price: decimal_field(v, "stopPrice").unwrap_or_default(),
        quantity: decimal_field(v, "origQty").unwrap_or_default(),
        filled_quantity: decimal_field(v, "executedQty").unwrap_or_default(),
        update_time: v.get("updateTime").and_then(|t| t.as_u64()).unwrap_or(0),
    })
}

/// Map a Binance order status string to an [`OrderStatus`] enum.
fn parse_order_status(status: &str) -> OrderStatus {
    match status {
        "NEW" => OrderStatus::New,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
        "PENDING_CANCEL" => OrderStatus::PendingCancel,
        _ => OrderStatus::New,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn market_order_params_have_no_price_or_tif() {
        let params = order_params(&OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.0100)));
        let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["symbol", "side", "type", "quantity", "newOrderRespType"]);
        assert_eq!(params[3].1, "0.01");
    }

    #[test]
    fn stop_limit_params_use_binance_stop_type() {
        let req = OrderRequest::stop_limit("BTCUSDT", Side::Sell, dec!(0.01), dec!(50000), dec!(49900.50))
            .with_client_order_id("ab12cd34-2");
        let params = order_params(&req);
        let get = |k: &str| params.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("type"), Some("STOP"));
        assert_eq!(get("price"), Some("49900.5"));
        assert_eq!(get("stopPrice"), Some("50000"));
        assert_eq!(get("timeInForce"), Some("GTC"));
        assert_eq!(get("newClientOrderId"), Some("ab12cd34-2"));
    }

    #[test]
    fn order_report_reads_string_decimals() {
        let report = parse_order_report(&json!({
            "orderId": 42,
            "status": "PARTIALLY_FILLED",
            "executedQty": "0.004",
            "avgPrice": "51234.10"
        }))
        .unwrap();
        assert_eq!(report.status, OrderStatus::PartiallyFilled);
        assert_eq!(report.filled_quantity, dec!(0.004));
        assert_eq!(report.avg_price, dec!(51234.10));
    }

    #[test]
    fn placed_order_requires_order_id() {
        assert!(parse_placed_order(&json!({"status": "NEW"})).is_err());
        let placed = parse_placed_order(&json!({"orderId": 7, "status": "FILLED"})).unwrap();
        assert_eq!(placed.exchange_order_id, 7);
        assert_eq!(placed.status, OrderStatus::Filled);
    }

    #[test]
    fn open_order_parses_stop_fields() {
        let order = parse_open_order(&json!({
            "symbol": "BTCUSDT",
            "orderId": 99,
            "clientOrderId": "x-1",
            "side": "SELL",
            "type": "STOP",
            "status": "NEW",
            "timeInForce": "GTC",
            "positionSide": "SHORT",
            "price": "49900",
            "stopPrice": "50000",
            "origQty": "0.010",
            "executedQty": "0",
            "updateTime": 1700000000000u64
        }))
        .unwrap();
        assert_eq!(order.side, Side::Sell);
        assert_eq!(order.stop_price, dec!(50000));
        assert_eq!(order.quantity, dec!(0.01));
        assert_eq!(order.position_side, PositionSide::Short);
    }

    #[test]
    fn hedge_mode_orders_send_position_side() {
        let req =
            OrderRequest::limit("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000)).with_position_side(PositionSide::Long);
        let params = order_params(&req);
        assert!(params.contains(&("positionSide", "LONG".to_string())));
    }

    #[test]
    fn expired_in_match_is_expired() {
        assert_eq!(parse_order_status("EXPIRED_IN_MATCH"), OrderStatus::Expired);
        assert_eq!(parse_order_status("SOMETHING_NEW"), OrderStatus::New);
    }
}

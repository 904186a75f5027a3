//! Binance USDT-margined futures REST client.
//!
//! Thin transport layer: builds signed requests, sends them, and classifies
//! failures into [`ExchangeError`] variants. Responses are returned as raw
//! JSON; typed mapping lives in the parent module.
//!
//! # Error classification
//!
//! | Condition                                   | Error            |
//! |---------------------------------------------|------------------|
//! | transport failure, timeout, HTTP 5xx / 429  | `Network`        |
//! | Binance code -2011 / -2013                  | `OrderNotFound`  |
//! | any other 4xx                               | `Rejected`       |
//! | success status with unparsable body         | `Decode`         |

use fbot_core::error::ExchangeError;
use reqwest::{Method, StatusCode};
use tracing::debug;

use super::auth::RequestSigner;
use super::config::BinanceFuturesConfig;
use crate::ExchangeResult;

/// `CANCEL_REJECTED` / unknown order on cancel.
const CODE_CANCEL_UNKNOWN: i64 = -2011;
/// `NO_SUCH_ORDER` on query.
const CODE_NO_SUCH_ORDER: i64 = -2013;

/// Binance futures REST client.
pub struct FuturesClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    /// API key sent as `X-MBX-APIKEY`.
    api_key: String,
    /// Query signer (secret + recvWindow).
    signer: RequestSigner,
    /// REST base URL (e.g. `https://fapi.binance.com`).
    base_url: String,
}

impl FuturesClient {
    /// Create a new client (no connections opened yet).
    pub fn new(config: &BinanceFuturesConfig) -> ExchangeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            signer: RequestSigner::new(config.secret_key.clone(), config.recv_window),
            base_url: config.base_url().trim_end_matches('/').to_string(),
        })
    }

    // -----------------------------------------------------------------------
    // Public endpoints
    // -----------------------------------------------------------------------

    /// `GET /fapi/v1/ticker/price`.
    pub async fn ticker_price(&self, symbol: &str) -> ExchangeResult<serde_json::Value> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, urlencoding::encode(symbol));
        self.execute(self.http.get(&url), "ticker price").await
    }

    // -----------------------------------------------------------------------
    // Signed endpoints
    // -----------------------------------------------------------------------

    /// `POST /fapi/v1/order`.
    pub async fn new_order(&self, params: &[(&str, String)]) -> ExchangeResult<serde_json::Value> {
        self.signed(Method::POST, "/fapi/v1/order", params, "new order").await
    }

    /// `DELETE /fapi/v1/order`.
    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> ExchangeResult<serde_json::Value> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        self.signed(Method::DELETE, "/fapi/v1/order", &params, "cancel order").await
    }

    /// `GET /fapi/v1/order`.
    pub async fn query_order(&self, symbol: &str, order_id: u64) -> ExchangeResult<serde_json::Value> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        self.signed(Method::GET, "/fapi/v1/order", &params, "query order").await
    }

    /// `GET /fapi/v1/openOrders`, optionally filtered by symbol.
    pub async fn open_orders(&self, symbol: Option<&str>) -> ExchangeResult<serde_json::Value> {
        let params: Vec<(&str, String)> = symbol.map(|s| vec![("symbol", s.to_string())]).unwrap_or_default();
        self.signed(Method::GET, "/fapi/v1/openOrders", &params, "open orders").await
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> ExchangeResult<serde_json::Value> {
        let query = self.signer.sign(params);
        let url = format!("{}{path}?{query}", self.base_url);
        let req = self.http.request(method, &url).header("X-MBX-APIKEY", &self.api_key);
        self.execute(req, what).await
    }

    async fn execute(&self, req: reqwest::RequestBuilder, what: &str) -> ExchangeResult<serde_json::Value> {
        let resp = req
            .send()
            .await
            .map_err(|e| ExchangeError::Network(format!("{what} request failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExchangeError::Network(format!("{what} response read failed: {e}")))?;

        debug!("[binance-td] {what} → HTTP {}", status.as_u16());

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{what}: {e}")));
        }
        Err(classify_error(status, &body))
    }
}

/// Map a non-success HTTP response to an [`ExchangeError`].
pub(crate) fn classify_error(status: StatusCode, body: &str) -> ExchangeError {
    let api_error = serde_json::from_str::<serde_json::Value>(body).ok().and_then(|v| {
        let code = v.get("code")?.as_i64()?;
        let msg = v.get("msg")?.as_str()?.to_string();
        Some((code, msg))
    });

    match api_error {
        Some((CODE_CANCEL_UNKNOWN | CODE_NO_SUCH_ORDER, msg)) => ExchangeError::OrderNotFound(msg),
        _ if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
            ExchangeError::Network(format!("HTTP {}: {body}", status.as_u16()))
        }
        Some((code, reason)) => ExchangeError::Rejected { code, reason },
        None => ExchangeError::Rejected {
            code: i64::from(status.as_u16()),
            reason: body.to_string(),
        },
    }
}

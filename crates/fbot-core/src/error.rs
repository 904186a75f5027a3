//! Typed error definitions for the futures bot.
//!
//! [`ValidationError`] covers bad input caught before any network call;
//! [`ExchangeError`] covers everything the trading client can report back.
//! Both implement `std::error::Error` via `thiserror`, so they integrate with
//! `anyhow::Result` at the process boundary.

use rust_decimal::Decimal;
use thiserror::Error;

/// Input rejected before any exchange call is made.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// OCO prices are not ordered around the current price.
    #[error("invalid price relationship: {0}")]
    InvalidPriceRelationship(String),

    /// TWAP slice count below one.
    #[error("invalid slice count {0}: must be at least 1")]
    InvalidSliceCount(u32),

    /// Non-positive (or rounds-to-zero) quantity.
    #[error("invalid quantity {0}: must be positive")]
    InvalidQuantity(Decimal),

    /// Grid bounds inverted or fewer than two levels.
    #[error("invalid grid range: {0}")]
    InvalidGridRange(String),

    #[error("invalid side '{0}': expected BUY or SELL")]
    InvalidSide(String),

    #[error("invalid time in force '{0}': expected GTC, IOC or FOK")]
    InvalidTimeInForce(String),

    #[error("invalid position side '{0}': expected BOTH, LONG or SHORT")]
    InvalidPositionSide(String),
}

/// Failure reported by (or while talking to) the exchange.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExchangeError {
    /// The exchange refused the request.
    #[error("rejected by exchange (code {code}): {reason}")]
    Rejected { code: i64, reason: String },

    /// Transport failure or server-side error; outcome unknown.
    #[error("network error: {0}")]
    Network(String),

    /// The order is unknown or already terminal.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Response body could not be interpreted.
    #[error("decode error: {0}")]
    Decode(String),

    /// The operation is not available for this order.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ExchangeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::OrderNotFound(_))
    }
}

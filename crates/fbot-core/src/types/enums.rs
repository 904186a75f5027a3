//! Enumerations used throughout the futures bot.
//!
//! Exchange-facing enums ([`Side`], [`OrderType`], [`OrderStatus`]) mirror the
//! Binance futures vocabulary; engine-facing enums ([`LegState`],
//! [`RunStatus`]) describe the lifecycle of strategy legs and runs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the Binance REST API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// The opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(ValidationError::InvalidSide(other.to_string())),
        }
    }
}

/// Position a futures order applies to. `Both` is one-way mode; `Long` and
/// `Short` address the two books of a hedge-mode account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    #[default]
    Both,
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Both => "BOTH",
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BOTH" => Ok(Self::Both),
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            other => Err(ValidationError::InvalidPositionSide(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Order type / time in force
// ---------------------------------------------------------------------------

/// Order type of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    /// Stop trigger plus limit price (Binance futures `STOP`).
    StopLimit,
}

impl OrderType {
    /// Binance futures `type` parameter for this order type.
    pub fn as_binance(self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::StopLimit => "STOP",
        }
    }

    /// Whether orders of this type carry a limit price.
    pub fn is_priced(self) -> bool {
        !matches!(self, Self::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => f.write_str("MARKET"),
            Self::Limit => f.write_str("LIMIT"),
            Self::StopLimit => f.write_str("STOP_LIMIT"),
        }
    }
}

/// Time in force for priced orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
        }
    }
}

impl FromStr for TimeInForce {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GTC" => Ok(Self::Gtc),
            "IOC" => Ok(Self::Ioc),
            "FOK" => Ok(Self::Fok),
            other => Err(ValidationError::InvalidTimeInForce(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange order status
// ---------------------------------------------------------------------------

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    PendingCancel,
}

impl OrderStatus {
    /// Whether the exchange will never change this order again.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected | Self::Expired)
    }
}

// ---------------------------------------------------------------------------
// Engine lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of a single strategy leg.
///
/// ```text
/// PENDING → SUBMITTED → PARTIALLY_FILLED → FILLED
///               │              └─────────→ CANCELLED
///               ├──→ FILLED | REJECTED | CANCELLED
/// PENDING → REJECTED   (refused at placement)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegState {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
}

impl LegState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Rejected | Self::Cancelled)
    }

    /// States in which fill quantities may still change.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Submitted | Self::PartiallyFilled)
    }
}

impl From<OrderStatus> for LegState {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::New | OrderStatus::PendingCancel => Self::Submitted,
            OrderStatus::PartiallyFilled => Self::PartiallyFilled,
            OrderStatus::Filled => Self::Filled,
            OrderStatus::Canceled | OrderStatus::Expired => Self::Cancelled,
            OrderStatus::Rejected => Self::Rejected,
        }
    }
}

/// Aggregate status of a strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Which strategy a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Twap,
    Grid,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Twap => f.write_str("twap"),
            Self::Grid => f.write_str("grid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!(" SELL ".parse::<Side>().unwrap(), Side::Sell);
        assert!("hold".parse::<Side>().is_err());
    }

    #[test]
    fn position_side_defaults_to_one_way_mode() {
        assert_eq!(PositionSide::default(), PositionSide::Both);
        assert_eq!("long".parse::<PositionSide>().unwrap(), PositionSide::Long);
        assert_eq!(
            "hedge".parse::<PositionSide>(),
            Err(ValidationError::InvalidPositionSide("HEDGE".into()))
        );
    }

    #[test]
    fn expired_orders_count_as_cancelled_legs() {
        assert_eq!(LegState::from(OrderStatus::Expired), LegState::Cancelled);
        assert_eq!(LegState::from(OrderStatus::PendingCancel), LegState::Submitted);
        assert!(LegState::from(OrderStatus::Filled).is_terminal());
    }

    #[test]
    fn stop_limit_maps_to_binance_stop() {
        assert_eq!(OrderType::StopLimit.as_binance(), "STOP");
        assert!(!OrderType::Market.is_priced());
    }
}

//! Core data types shared by the trading client and the strategy engine.
//!
//! Prices and quantities are [`rust_decimal::Decimal`] throughout so that
//! slice arithmetic and grid spacing are exact.

pub mod enums;
pub mod trading;

pub use enums::*;
pub use trading::*;

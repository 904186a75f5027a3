//! # fbot-core
//!
//! Core crate for the futures bot, providing:
//!
//! - **Types** (`types`): side/order/run enums and the order request/report structs
//!   exchanged with the trading client
//! - **Configuration** (`config`): JSON config deserialization with env overrides
//! - **Error types** (`error`): validation and exchange errors via thiserror
//! - **Time utilities** (`time_util`): millisecond wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;

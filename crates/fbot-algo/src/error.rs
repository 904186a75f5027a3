//! Errors surfaced by the strategy engine to its callers.
//!
//! Per-leg failures inside a running strategy are absorbed into leg and run
//! state; only the variants below ever reach the caller of an engine
//! operation.

use fbot_core::error::{ExchangeError, ValidationError};
use thiserror::Error;
use uuid::Uuid;

/// Engine-level error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Bad input, caught before any exchange call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Exchange failure on the call that starts a run or pair.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// One OCO leg could not be placed. A take-profit already placed is
    /// cancelled; if that cancel does not succeed its ID is reported in
    /// `exposed_order_id`.
    #[error("partial OCO submission in group {group_id}: {cause}{}", exposed_suffix(.exposed_order_id))]
    PartialOcoSubmission {
        group_id: Uuid,
        cause: ExchangeError,
        /// Exchange ID of the leg that was cancelled to compensate.
        compensated_order_id: Option<u64>,
        /// Placed leg that could not be cancelled: still live, or already
        /// filled.
        exposed_order_id: Option<u64>,
    },

    #[error("run {0} not found")]
    RunNotFound(Uuid),
}

pub type EngineResult<T> = Result<T, EngineError>;

fn exposed_suffix(order_id: &Option<u64>) -> String {
    order_id
        .map(|id| format!(" (order {id} was not cancelled)"))
        .unwrap_or_default()
}

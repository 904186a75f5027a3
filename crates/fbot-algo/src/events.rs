//! Engine events and the logging capability that receives them.
//!
//! Every leg transition, rejection, re-arm decision and race observation is
//! reported as an [`EngineEvent`] to the [`EventLogger`] the engine was built
//! with. Recording is synchronous and must never block the executor.

use std::fmt;

use fbot_core::enums::{LegState, OrderType, RunStatus, Side, StrategyKind};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::leg::LegId;
use crate::oco::OcoOutcome;

/// A typed event emitted by the strategy engine.
///
/// `owner` is the run ID for TWAP/grid legs and the group ID for OCO legs.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunStarted {
        run_id: Uuid,
        kind: StrategyKind,
        symbol: String,
    },

    /// The exchange accepted a leg.
    LegPlaced {
        owner: Uuid,
        leg_id: LegId,
        exchange_order_id: u64,
        side: Side,
        order_type: OrderType,
        quantity: Decimal,
        price: Option<Decimal>,
    },

    /// The exchange refused a leg at placement time.
    LegRejected {
        owner: Uuid,
        leg_id: LegId,
        reason: String,
    },

    /// A leg moved between states after a status report or cancel.
    LegTransition {
        owner: Uuid,
        leg_id: LegId,
        from: LegState,
        to: LegState,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
    },

    /// A status query or cancel failed; the leg keeps its last known state.
    LegError {
        owner: Uuid,
        leg_id: LegId,
        operation: &'static str,
        error: String,
    },

    /// A leg did not reach a terminal state within the fill timeout.
    FillTimeout {
        owner: Uuid,
        leg_id: LegId,
        state: LegState,
    },

    /// A grid fill produced the opposite order one level over.
    GridRearmed {
        run_id: Uuid,
        filled_level: usize,
        level: usize,
        side: Side,
    },

    RearmSkipped {
        run_id: Uuid,
        filled_level: usize,
        reason: String,
    },

    OcoPlaced {
        group_id: Uuid,
        take_profit_order_id: u64,
        stop_loss_order_id: u64,
    },

    /// An OCO leg was cancelled because its sibling could not be placed.
    OcoCompensated {
        group_id: Uuid,
        cancelled_order_id: u64,
    },

    /// Both OCO legs filled before the sibling cancel took effect.
    RaceCondition {
        group_id: Uuid,
        take_profit_order_id: Option<u64>,
        stop_loss_order_id: Option<u64>,
    },

    OcoClosed {
        group_id: Uuid,
        outcome: OcoOutcome,
    },

    StopRequested {
        run_id: Uuid,
    },

    RunFinished {
        run_id: Uuid,
        status: RunStatus,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
        error: Option<String>,
    },
}

impl EngineEvent {
    /// Stable event name, used as the `event` field in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "RunStarted",
            Self::LegPlaced { .. } => "LegPlaced",
            Self::LegRejected { .. } => "LegRejected",
            Self::LegTransition { .. } => "LegTransition",
            Self::LegError { .. } => "LegError",
            Self::FillTimeout { .. } => "FillTimeout",
            Self::GridRearmed { .. } => "GridRearmed",
            Self::RearmSkipped { .. } => "RearmSkipped",
            Self::OcoPlaced { .. } => "OcoPlaced",
            Self::OcoCompensated { .. } => "OcoCompensated",
            Self::RaceCondition { .. } => "RaceCondition",
            Self::OcoClosed { .. } => "OcoClosed",
            Self::StopRequested { .. } => "StopRequested",
            Self::RunFinished { .. } => "RunFinished",
        }
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), T::to_string)
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { run_id, kind, symbol } => write!(f, "{kind} run {run_id} started on {symbol}"),
            Self::LegPlaced {
                owner,
                leg_id,
                exchange_order_id,
                side,
                order_type,
                quantity,
                price,
            } => write!(
                f,
                "{owner} leg {leg_id} placed: {side} {order_type} {quantity} @ {} (order {exchange_order_id})",
                opt(price)
            ),
            Self::LegRejected { owner, leg_id, reason } => write!(f, "{owner} leg {leg_id} rejected: {reason}"),
            Self::LegTransition {
                owner,
                leg_id,
                from,
                to,
                filled_quantity,
                avg_fill_price,
            } => write!(
                f,
                "{owner} leg {leg_id} {from:?} -> {to:?} (filled {filled_quantity} @ {avg_fill_price})"
            ),
            Self::LegError {
                owner,
                leg_id,
                operation,
                error,
            } => write!(f, "{owner} leg {leg_id} {operation} failed: {error}"),
            Self::FillTimeout { owner, leg_id, state } => {
                write!(f, "{owner} leg {leg_id} still {state:?} after fill timeout")
            }
            Self::GridRearmed {
                run_id,
                filled_level,
                level,
                side,
            } => write!(f, "grid {run_id}: level {filled_level} filled, {side} re-armed at level {level}"),
            Self::RearmSkipped {
                run_id,
                filled_level,
                reason,
            } => write!(f, "grid {run_id}: re-arm after level {filled_level} skipped: {reason}"),
            Self::OcoPlaced {
                group_id,
                take_profit_order_id,
                stop_loss_order_id,
            } => write!(
                f,
                "OCO {group_id} placed: take-profit {take_profit_order_id}, stop-loss {stop_loss_order_id}"
            ),
            Self::OcoCompensated {
                group_id,
                cancelled_order_id,
            } => write!(f, "OCO {group_id}: cancelled order {cancelled_order_id} after partial submission"),
            Self::RaceCondition {
                group_id,
                take_profit_order_id,
                stop_loss_order_id,
            } => write!(
                f,
                "OCO {group_id}: both legs filled (take-profit {}, stop-loss {})",
                opt(take_profit_order_id),
                opt(stop_loss_order_id)
            ),
            Self::OcoClosed { group_id, outcome } => write!(f, "OCO {group_id} closed: {outcome:?}"),
            Self::StopRequested { run_id } => write!(f, "stop requested for run {run_id}"),
            Self::RunFinished {
                run_id,
                status,
                filled_quantity,
                avg_fill_price,
                error,
            } => {
                write!(f, "run {run_id} finished {status:?}: filled {filled_quantity} @ {avg_fill_price}")?;
                if let Some(error) = error {
                    write!(f, " ({error})")?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Logger capability
// ---------------------------------------------------------------------------

/// Sink for engine events. Implementations must not block.
pub trait EventLogger: Send + Sync {
    fn record(&self, event: EngineEvent);
}

/// Default logger: one `tracing` event per engine event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn record(&self, event: EngineEvent) {
        let name = event.name();
        match &event {
            EngineEvent::RunFinished {
                status: RunStatus::Failed,
                ..
            } => error!(event = name, "[engine] {event}"),
            EngineEvent::LegRejected { .. }
            | EngineEvent::LegError { .. }
            | EngineEvent::FillTimeout { .. }
            | EngineEvent::RearmSkipped { .. }
            | EngineEvent::OcoCompensated { .. }
            | EngineEvent::RaceCondition { .. } => warn!(event = name, "[engine] {event}"),
            _ => info!(event = name, "[engine] {event}"),
        }
    }
}

/// Sender half of an engine event channel.
pub type EngineEventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

/// Receiver half of an engine event channel.
pub type EngineEventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;

impl EventLogger for EngineEventSender {
    fn record(&self, event: EngineEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.send(event);
    }
}

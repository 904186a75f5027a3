//! Strategy run state and the handle returned to callers.

use fbot_core::enums::{RunStatus, StrategyKind};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::leg::{LegId, OrderLeg};

pub type RunId = Uuid;

/// One price level of a grid run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLevel {
    pub level_index: usize,
    pub price: Decimal,
    /// Leg currently resting on this level, if any.
    pub active_leg_id: Option<LegId>,
}

/// Snapshot of a TWAP or grid run.
///
/// The executor task owns the live copy; everyone else sees clones published
/// through a `watch` channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyRun {
    pub run_id: RunId,
    pub kind: StrategyKind,
    pub symbol: String,
    pub status: RunStatus,
    /// TWAP: the requested total. Grid: sum of all placed leg quantities.
    pub total_quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Quantity-weighted mean over legs with fills.
    pub avg_fill_price: Decimal,
    /// Placement order.
    pub legs: Vec<OrderLeg>,
    /// Empty for TWAP runs.
    pub levels: Vec<GridLevel>,
    /// ms since epoch.
    pub started_at: u64,
    pub ended_at: Option<u64>,
    /// Last fatal reason.
    pub error: Option<String>,
}

impl StrategyRun {
    pub fn new(run_id: RunId, kind: StrategyKind, symbol: &str, total_quantity: Decimal, started_at: u64) -> Self {
        Self {
            run_id,
            kind,
            symbol: symbol.to_string(),
            status: RunStatus::Running,
            total_quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            legs: Vec::new(),
            levels: Vec::new(),
            started_at,
            ended_at: None,
            error: None,
        }
    }

    pub fn remaining_quantity(&self) -> Decimal {
        (self.total_quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    pub fn leg(&self, leg_id: LegId) -> Option<&OrderLeg> {
        self.legs.iter().find(|l| l.leg_id == leg_id)
    }

    /// Recompute filled quantity and average price from the legs.
    pub fn recompute_fills(&mut self) {
        let (filled, notional) = self
            .legs
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(q, n), leg| {
                (q + leg.filled_quantity, n + leg.notional())
            });
        self.filled_quantity = filled;
        self.avg_fill_price = if filled.is_zero() {
            Decimal::ZERO
        } else {
            notional / filled
        };
    }
}

/// Caller-side handle to a running strategy.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: RunId,
    snapshot: watch::Receiver<StrategyRun>,
}

impl RunHandle {
    pub(crate) fn new(run_id: RunId, snapshot: watch::Receiver<StrategyRun>) -> Self {
        Self { run_id, snapshot }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Latest published snapshot.
    pub fn status(&self) -> StrategyRun {
        self.snapshot.borrow().clone()
    }

    /// Wait until the run reaches a terminal status.
    pub async fn wait(&mut self) -> StrategyRun {
        wait_terminal(&mut self.snapshot).await
    }
}

/// Wait on a snapshot channel until the run is terminal. If the executor is
/// gone the last published snapshot is returned.
pub(crate) async fn wait_terminal(rx: &mut watch::Receiver<StrategyRun>) -> StrategyRun {
    let done = rx.wait_for(|run| run.status.is_terminal()).await.map(|run| run.clone());
    done.unwrap_or_else(|_| rx.borrow().clone())
}

//! Client-side one-cancels-other pairs.
//!
//! A pair is a take-profit LIMIT and a protective STOP_LIMIT on the same side
//! and quantity. The exchange does not link them; [`OcoCoordinator::supervise`]
//! polls both and cancels the survivor as soon as one fills.
//!
//! | Observation                                 | Action / outcome          |
//! |---------------------------------------------|---------------------------|
//! | one leg FILLED, sibling live                | cancel sibling            |
//! | sibling cancel → not found, sibling FILLED  | `RaceCondition`, both fill|
//! | both FILLED in the same poll                | `RaceCondition`, no cancel|
//! | stop requested                              | cancel both live legs     |

use std::sync::Arc;

use fbot_core::config::EngineConfig;
use fbot_core::enums::{LegState, PositionSide, Side, TimeInForce};
use fbot_core::error::ValidationError;
use fbot_core::trading::OrderRequest;
use fbot_td::ExchangeClient;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::{Wait, cancellable_sleep};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventLogger};
use crate::leg::{CancelOutcome, LegOps, OrderLeg};

const TAKE_PROFIT_LEG: u64 = 1;
const STOP_LOSS_LEG: u64 = 2;

/// Parameters of an OCO pair. `side` is the side of the closing orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub take_profit_price: Decimal,
    /// Stop trigger price.
    pub stop_price: Decimal,
    /// Limit price of the stop order once triggered.
    pub stop_limit_price: Decimal,
    pub position_side: PositionSide,
}

impl OcoRequest {
    pub fn new(symbol: &str, side: Side, quantity: Decimal, prices: OcoPrices) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            take_profit_price: prices.take_profit,
            stop_price: prices.stop,
            stop_limit_price: prices.stop_limit,
            position_side: PositionSide::Both,
        }
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = position_side;
        self
    }

    /// Checks that need no market data.
    fn validate_static(&self) -> Result<(), ValidationError> {
        if self.quantity <= Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity(self.quantity));
        }
        let prices = [self.take_profit_price, self.stop_price, self.stop_limit_price];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(ValidationError::InvalidPriceRelationship(
                "all prices must be positive".to_string(),
            ));
        }
        let ordered = match self.side {
            Side::Sell => self.take_profit_price > self.stop_price,
            Side::Buy => self.take_profit_price < self.stop_price,
        };
        if !ordered {
            return Err(ValidationError::InvalidPriceRelationship(format!(
                "{} OCO needs take-profit {} the stop: take-profit {}, stop {}",
                self.side,
                if self.side == Side::Sell { "above" } else { "below" },
                self.take_profit_price,
                self.stop_price
            )));
        }
        Ok(())
    }

    /// The current price must sit strictly between take-profit and stop.
    fn validate_bracket(&self, current: Decimal) -> Result<(), ValidationError> {
        let (low, high) = match self.side {
            Side::Sell => (self.stop_price, self.take_profit_price),
            Side::Buy => (self.take_profit_price, self.stop_price),
        };
        if low < current && current < high {
            Ok(())
        } else {
            Err(ValidationError::InvalidPriceRelationship(format!(
                "current price {current} is outside ({low}, {high})"
            )))
        }
    }
}

/// Take-profit / stop / stop-limit prices for an OCO pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcoPrices {
    pub take_profit: Decimal,
    pub stop: Decimal,
    pub stop_limit: Decimal,
}

impl OcoPrices {
    /// Derive prices from percent distances around `current` (2 = 2%). The
    /// stop-limit sits 1% beyond the stop so the triggered order still fills.
    pub fn from_percentages(
        side: Side,
        current: Decimal,
        take_profit_pct: Decimal,
        stop_loss_pct: Decimal,
        precision: u32,
    ) -> Result<Self, ValidationError> {
        let hundred = Decimal::ONE_HUNDRED;
        let in_range = |pct: Decimal| pct > Decimal::ZERO && pct < hundred;
        if current <= Decimal::ZERO || !in_range(take_profit_pct) || !in_range(stop_loss_pct) {
            return Err(ValidationError::InvalidPriceRelationship(format!(
                "need positive price and percentages in (0, 100): price {current}, tp {take_profit_pct}%, sl {stop_loss_pct}%"
            )));
        }

        let tp = take_profit_pct / hundred;
        let sl = stop_loss_pct / hundred;
        let slippage = Decimal::ONE / hundred;
        let (take_profit, stop, stop_limit) = match side {
            // Closing a long: profit above, stop below.
            Side::Sell => {
                let stop = current * (Decimal::ONE - sl);
                (current * (Decimal::ONE + tp), stop, stop * (Decimal::ONE - slippage))
            }
            // Closing a short: profit below, stop above.
            Side::Buy => {
                let stop = current * (Decimal::ONE + sl);
                (current * (Decimal::ONE - tp), stop, stop * (Decimal::ONE + slippage))
            }
        };
        Ok(Self {
            take_profit: take_profit.round_dp(precision),
            stop: stop.round_dp(precision),
            stop_limit: stop_limit.round_dp(precision),
        })
    }
}

/// How a pair ended (or `Open` while supervision is running).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcoOutcome {
    Open,
    TakeProfitFilled,
    StopLossFilled,
    /// Both legs filled; reported through a `RaceCondition` event.
    BothFilled,
    /// Both legs closed without a fill.
    Cancelled,
}

/// A take-profit / stop-loss pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcoPair {
    pub group_id: Uuid,
    pub symbol: String,
    pub take_profit: OrderLeg,
    pub stop_loss: OrderLeg,
    pub outcome: OcoOutcome,
}

impl OcoPair {
    fn observed_outcome(&self) -> OcoOutcome {
        let tp = self.take_profit.state == LegState::Filled;
        let sl = self.stop_loss.state == LegState::Filled;
        match (tp, sl) {
            (true, true) => OcoOutcome::BothFilled,
            (true, false) => OcoOutcome::TakeProfitFilled,
            (false, true) => OcoOutcome::StopLossFilled,
            _ if self.take_profit.is_terminal() && self.stop_loss.is_terminal() => OcoOutcome::Cancelled,
            _ => OcoOutcome::Open,
        }
    }
}

/// Places and supervises OCO pairs.
#[derive(Clone)]
pub struct OcoCoordinator {
    exchange: Arc<dyn ExchangeClient>,
    logger: Arc<dyn EventLogger>,
    config: EngineConfig,
}

impl OcoCoordinator {
    pub fn new(exchange: Arc<dyn ExchangeClient>, logger: Arc<dyn EventLogger>, config: EngineConfig) -> Self {
        Self {
            exchange,
            logger,
            config,
        }
    }

    fn ops(&self, group_id: Uuid) -> LegOps<'_> {
        LegOps {
            exchange: self.exchange.as_ref(),
            logger: self.logger.as_ref(),
            owner: group_id,
        }
    }

    /// Validate and place both legs (take-profit first).
    ///
    /// Price ordering is checked before any exchange call; the bracket around
    /// the current price right after fetching it. If the second leg fails the
    /// first is cancelled and [`EngineError::PartialOcoSubmission`] returned.
    pub async fn place_oco(&self, request: &OcoRequest) -> EngineResult<OcoPair> {
        request.validate_static()?;
        let current = self.exchange.get_current_price(&request.symbol).await?;
        request.validate_bracket(current)?;

        let group_id = Uuid::new_v4();
        let ops = self.ops(group_id);
        info!(
            "[oco] {group_id} {} {} {}: take-profit {}, stop {} (limit {}), current {current}",
            request.symbol,
            request.side,
            request.quantity,
            request.take_profit_price,
            request.stop_price,
            request.stop_limit_price
        );

        let tp_order = OrderRequest::limit(&request.symbol, request.side, request.quantity, request.take_profit_price)
            .with_time_in_force(TimeInForce::Gtc)
            .with_position_side(request.position_side);
        let mut take_profit = OrderLeg::new(TAKE_PROFIT_LEG, group_id, tp_order);
        if let Err(cause) = ops.submit(&mut take_profit).await {
            return Err(EngineError::PartialOcoSubmission {
                group_id,
                cause,
                compensated_order_id: None,
                exposed_order_id: None,
            });
        }

        let sl_order = OrderRequest::stop_limit(
            &request.symbol,
            request.side,
            request.quantity,
            request.stop_price,
            request.stop_limit_price,
        )
        .with_position_side(request.position_side);
        let mut stop_loss = OrderLeg::new(STOP_LOSS_LEG, group_id, sl_order);
        if let Err(cause) = ops.submit(&mut stop_loss).await {
            let (compensated_order_id, exposed_order_id) = self.compensate(&ops, &mut take_profit).await;
            return Err(EngineError::PartialOcoSubmission {
                group_id,
                cause,
                compensated_order_id,
                exposed_order_id,
            });
        }

        if let (Some(take_profit_order_id), Some(stop_loss_order_id)) =
            (take_profit.exchange_order_id, stop_loss.exchange_order_id)
        {
            self.logger.record(EngineEvent::OcoPlaced {
                group_id,
                take_profit_order_id,
                stop_loss_order_id,
            });
        }

        Ok(OcoPair {
            group_id,
            symbol: request.symbol.clone(),
            take_profit,
            stop_loss,
            outcome: OcoOutcome::Open,
        })
    }

    /// Cancel a placed take-profit whose stop-loss could not be placed.
    /// Returns `(compensated, exposed)` order IDs: exactly one is set.
    async fn compensate(&self, ops: &LegOps<'_>, take_profit: &mut OrderLeg) -> (Option<u64>, Option<u64>) {
        let Some(order_id) = take_profit.exchange_order_id else {
            return (None, None);
        };
        let group_id = ops.owner;
        match ops.cancel(take_profit).await {
            CancelOutcome::Cancelled | CancelOutcome::AlreadyClosed(LegState::Cancelled) => {
                self.logger.record(EngineEvent::OcoCompensated {
                    group_id,
                    cancelled_order_id: order_id,
                });
                (Some(order_id), None)
            }
            outcome => {
                self.logger.record(EngineEvent::LegError {
                    owner: group_id,
                    leg_id: take_profit.leg_id,
                    operation: "oco compensation",
                    error: format!("take-profit order {order_id} left {:?}: {outcome:?}", take_profit.state),
                });
                (None, Some(order_id))
            }
        }
    }

    /// Poll both legs until they are terminal, cancelling the sibling of the
    /// first fill. Setting `stop` cancels both live legs and ends supervision.
    pub async fn supervise(&self, mut pair: OcoPair, mut stop: watch::Receiver<bool>) -> OcoPair {
        let ops = self.ops(pair.group_id);
        let poll = self.config.oco_poll_interval();

        loop {
            ops.refresh(&mut pair.take_profit).await;
            ops.refresh(&mut pair.stop_loss).await;

            match (pair.take_profit.state, pair.stop_loss.state) {
                (LegState::Filled, LegState::Filled) => {}
                (LegState::Filled, _) => {
                    debug!("[oco] {} take-profit filled, cancelling stop-loss", pair.group_id);
                    ops.cancel(&mut pair.stop_loss).await;
                }
                (_, LegState::Filled) => {
                    debug!("[oco] {} stop-loss filled, cancelling take-profit", pair.group_id);
                    ops.cancel(&mut pair.take_profit).await;
                }
                _ => {}
            }
            self.update_outcome(&mut pair);

            if pair.take_profit.is_terminal() && pair.stop_loss.is_terminal() {
                break;
            }
            if cancellable_sleep(&mut stop, poll).await == Wait::Cancelled {
                info!("[oco] {} supervision stopped, cancelling live legs", pair.group_id);
                ops.cancel(&mut pair.take_profit).await;
                ops.cancel(&mut pair.stop_loss).await;
                self.update_outcome(&mut pair);
                break;
            }
        }

        self.logger.record(EngineEvent::OcoClosed {
            group_id: pair.group_id,
            outcome: pair.outcome,
        });
        pair
    }

    /// Refresh `pair.outcome`, reporting a race the first time both fills
    /// are seen.
    fn update_outcome(&self, pair: &mut OcoPair) {
        let outcome = pair.observed_outcome();
        if outcome == OcoOutcome::BothFilled && pair.outcome != OcoOutcome::BothFilled {
            self.logger.record(EngineEvent::RaceCondition {
                group_id: pair.group_id,
                take_profit_order_id: pair.take_profit.exchange_order_id,
                stop_loss_order_id: pair.stop_loss.exchange_order_id,
            });
        }
        pair.outcome = outcome;
    }

    /// Run [`supervise`](Self::supervise) on its own task.
    pub fn spawn(&self, pair: OcoPair) -> OcoHandle {
        let (stop, rx) = watch::channel(false);
        let group_id = pair.group_id;
        let this = self.clone();
        let task = tokio::spawn(async move { this.supervise(pair, rx).await });
        OcoHandle { group_id, stop, task }
    }
}

/// Handle to a pair supervised on its own task.
pub struct OcoHandle {
    group_id: Uuid,
    stop: watch::Sender<bool>,
    task: JoinHandle<OcoPair>,
}

impl OcoHandle {
    pub fn group_id(&self) -> Uuid {
        self.group_id
    }

    /// Stop supervising and cancel any live leg.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait for supervision to end.
    pub async fn join(self) -> Result<OcoPair, JoinError> {
        self.task.await
    }
}

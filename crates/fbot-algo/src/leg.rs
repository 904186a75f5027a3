//! Order legs: one exchange order owned by a run or an OCO pair.
//!
//! [`OrderLeg`] holds the state machine; [`LegOps`] performs the exchange
//! calls that drive it and reports every transition to the event logger.
//!
//! ```text
//! PENDING ──place ok──→ SUBMITTED ──report──→ PARTIALLY_FILLED ──→ FILLED
//!    │                      ├──report──→ FILLED | CANCELLED | REJECTED
//!    └──place refused──→ REJECTED
//! ```

use fbot_core::enums::{LegState, OrderType, PositionSide, Side, TimeInForce};
use fbot_core::error::ExchangeError;
use fbot_core::trading::{OrderReport, OrderRequest, PlacedOrder};
use fbot_td::ExchangeClient;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::events::{EngineEvent, EventLogger};

/// Leg identifier, unique within its owning run or pair.
pub type LegId = u64;

/// A single order owned by a strategy run or OCO pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLeg {
    pub leg_id: LegId,
    /// `<owner prefix>-<leg_id>`, sent as the exchange client order ID.
    pub client_order_id: String,
    /// Set once the exchange accepted the leg. Legs refused at placement end
    /// REJECTED without one, so REJECTED does not imply an exchange order.
    pub exchange_order_id: Option<u64>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub position_side: PositionSide,
    pub state: LegState,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub reject_reason: Option<String>,
    /// Grid level this leg sits on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<usize>,
}

impl OrderLeg {
    /// Build a PENDING leg from an order template.
    pub fn new(leg_id: LegId, owner: Uuid, request: OrderRequest) -> Self {
        Self {
            leg_id,
            client_order_id: client_order_id(owner, leg_id),
            exchange_order_id: None,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            position_side: request.position_side,
            state: LegState::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            reject_reason: None,
            level: None,
        }
    }

    /// The order this leg submits.
    pub fn request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            time_in_force: self.time_in_force,
            position_side: self.position_side,
            client_order_id: Some(self.client_order_id.clone()),
        }
    }

    /// Fill quantities only move in SUBMITTED / PARTIALLY_FILLED.
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Record exchange acceptance. Fill details arrive with status reports.
    pub fn mark_submitted(&mut self, placed: PlacedOrder) {
        if self.state != LegState::Pending {
            return;
        }
        self.exchange_order_id = Some(placed.exchange_order_id);
        self.state = LegState::Submitted;
    }

    /// Record a refusal at placement time.
    pub fn mark_rejected(&mut self, reason: impl Into<String>) {
        if self.state != LegState::Pending {
            return;
        }
        self.state = LegState::Rejected;
        self.reject_reason = Some(reason.into());
    }

    /// Fold a status report into the leg. Returns the previous state when the
    /// state changed. Reports for terminal or pending legs are ignored.
    pub fn apply_report(&mut self, report: &OrderReport) -> Option<LegState> {
        if !self.is_live() {
            return None;
        }
        let filled = report.filled_quantity.min(self.quantity).max(Decimal::ZERO);
        if filled > Decimal::ZERO {
            self.filled_quantity = filled;
            self.avg_fill_price = report.avg_price;
        }

        let previous = self.state;
        let next = LegState::from(report.status);
        if next == LegState::Rejected {
            self.reject_reason.get_or_insert_with(|| "rejected after placement".to_string());
        }
        self.state = next;
        (next != previous).then_some(previous)
    }

    /// Record a successful cancel. Returns the previous state.
    pub fn mark_cancelled(&mut self) -> Option<LegState> {
        if !self.is_live() {
            return None;
        }
        let previous = self.state;
        self.state = LegState::Cancelled;
        Some(previous)
    }

    /// `filled_quantity × avg_fill_price`.
    pub fn notional(&self) -> Decimal {
        self.filled_quantity * self.avg_fill_price
    }
}

/// Client order ID for a leg: first UUID group of the owner plus the leg ID.
pub fn client_order_id(owner: Uuid, leg_id: LegId) -> String {
    let simple = owner.simple().to_string();
    format!("fbot{}-{leg_id}", &simple[..8])
}

// ---------------------------------------------------------------------------
// Exchange operations on legs
// ---------------------------------------------------------------------------

/// Outcome of a cancel attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The exchange cancelled the order.
    Cancelled,
    /// Nothing to cancel: the leg was never accepted or is already terminal.
    NotLive,
    /// The exchange no longer knows the order as open; the leg was refreshed.
    AlreadyClosed(LegState),
    Failed(ExchangeError),
}

/// Exchange calls that drive legs, with event reporting.
pub struct LegOps<'a> {
    pub exchange: &'a dyn ExchangeClient,
    pub logger: &'a dyn EventLogger,
    /// Run or OCO group the legs belong to.
    pub owner: Uuid,
}

impl LegOps<'_> {
    /// Submit a PENDING leg. Any placement failure leaves the leg REJECTED.
    pub async fn submit(&self, leg: &mut OrderLeg) -> Result<(), ExchangeError> {
        match self.exchange.place_order(&leg.request()).await {
            Ok(placed) => {
                leg.mark_submitted(placed);
                self.logger.record(EngineEvent::LegPlaced {
                    owner: self.owner,
                    leg_id: leg.leg_id,
                    exchange_order_id: placed.exchange_order_id,
                    side: leg.side,
                    order_type: leg.order_type,
                    quantity: leg.quantity,
                    price: leg.price,
                });
                Ok(())
            }
            Err(e) => {
                leg.mark_rejected(e.to_string());
                self.logger.record(EngineEvent::LegRejected {
                    owner: self.owner,
                    leg_id: leg.leg_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Query the exchange and fold the report into a live leg.
    /// Returns the leg state afterwards (unchanged on query failure).
    pub async fn refresh(&self, leg: &mut OrderLeg) -> LegState {
        let Some(order_id) = leg.exchange_order_id.filter(|_| leg.is_live()) else {
            return leg.state;
        };
        match self.exchange.get_order_status(&leg.symbol, order_id).await {
            Ok(report) => {
                if let Some(from) = leg.apply_report(&report) {
                    self.record_transition(leg, from);
                }
            }
            Err(e) => self.logger.record(EngineEvent::LegError {
                owner: self.owner,
                leg_id: leg.leg_id,
                operation: "status query",
                error: e.to_string(),
            }),
        }
        leg.state
    }

    /// Cancel a live leg. Each call issues at most one cancel request, and
    /// none at all for a leg that is not live.
    pub async fn cancel(&self, leg: &mut OrderLeg) -> CancelOutcome {
        let Some(order_id) = leg.exchange_order_id.filter(|_| leg.is_live()) else {
            return CancelOutcome::NotLive;
        };
        match self.exchange.cancel_order(&leg.symbol, order_id).await {
            Ok(_) => {
                if let Some(from) = leg.mark_cancelled() {
                    self.record_transition(leg, from);
                }
                CancelOutcome::Cancelled
            }
            Err(e) if e.is_not_found() => {
                // Already closed on the exchange; learn how.
                let state = self.refresh(leg).await;
                CancelOutcome::AlreadyClosed(state)
            }
            Err(e) => {
                self.logger.record(EngineEvent::LegError {
                    owner: self.owner,
                    leg_id: leg.leg_id,
                    operation: "cancel",
                    error: e.to_string(),
                });
                CancelOutcome::Failed(e)
            }
        }
    }

    fn record_transition(&self, leg: &OrderLeg, from: LegState) {
        self.logger.record(EngineEvent::LegTransition {
            owner: self.owner,
            leg_id: leg.leg_id,
            from,
            to: leg.state,
            filled_quantity: leg.filled_quantity,
            avg_fill_price: leg.avg_fill_price,
        });
    }
}

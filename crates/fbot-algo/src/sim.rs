//! Scripted in-memory exchange for engine tests.
//!
//! MARKET orders fill at placement at the current price; priced orders rest
//! until a test fills or closes them. Failures are scripted ahead of time and
//! every call is counted.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use fbot_core::enums::{OrderStatus, OrderType};
use fbot_core::error::ExchangeError;
use fbot_core::trading::{OrderReport, OrderRequest, PlacedOrder};
use fbot_td::{ExchangeClient, ExchangeResult};
use rust_decimal::Decimal;

/// Per-method call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub place: usize,
    pub cancel: usize,
    pub status: usize,
    pub price: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.place + self.cancel + self.status + self.price
    }
}

struct SimOrder {
    request: OrderRequest,
    status: OrderStatus,
    filled: Decimal,
    avg_price: Decimal,
}

impl SimOrder {
    fn fill(&mut self, price: Decimal) {
        self.status = OrderStatus::Filled;
        self.filled = self.request.quantity;
        self.avg_price = self.request.price.unwrap_or(price);
    }
}

struct SimState {
    price: Decimal,
    next_id: u64,
    orders: BTreeMap<u64, SimOrder>,
    /// Scripted outcomes for upcoming placements: `None` lets one through.
    place_script: VecDeque<Option<ExchangeError>>,
    price_failures: VecDeque<ExchangeError>,
    cancel_failures: VecDeque<ExchangeError>,
    /// Orders whose next cancel loses the race against a fill.
    fill_on_cancel: BTreeSet<u64>,
    calls: Calls,
}

pub struct SimExchange {
    state: Mutex<SimState>,
}

impl SimExchange {
    pub fn new(price: Decimal) -> Self {
        Self {
            state: Mutex::new(SimState {
                price,
                next_id: 1000,
                orders: BTreeMap::new(),
                place_script: VecDeque::new(),
                price_failures: VecDeque::new(),
                cancel_failures: VecDeque::new(),
                fill_on_cancel: BTreeSet::new(),
                calls: Calls::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn set_price(&self, price: Decimal) {
        self.lock().price = price;
    }

    pub fn fail_next_place(&self, err: ExchangeError) {
        self.lock().place_script.push_back(Some(err));
    }

    /// Let the next scripted placement succeed.
    pub fn pass_next_place(&self) {
        self.lock().place_script.push_back(None);
    }

    pub fn fail_next_price(&self, err: ExchangeError) {
        self.lock().price_failures.push_back(err);
    }

    pub fn fail_next_cancel(&self, err: ExchangeError) {
        self.lock().cancel_failures.push_back(err);
    }

    /// Fill an order completely at its limit price (or the current price).
    pub fn fill(&self, order_id: u64) {
        let mut state = self.lock();
        let price = state.price;
        state.orders.get_mut(&order_id).unwrap().fill(price);
    }

    pub fn set_status(&self, order_id: u64, status: OrderStatus) {
        self.lock().orders.get_mut(&order_id).unwrap().status = status;
    }

    /// The next cancel of this order loses the race: the order fills and the
    /// cancel reports it as unknown. The order need not exist yet.
    pub fn fill_on_cancel(&self, order_id: u64) {
        self.lock().fill_on_cancel.insert(order_id);
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    pub fn order(&self, order_id: u64) -> Option<OrderRequest> {
        self.lock().orders.get(&order_id).map(|o| o.request.clone())
    }

    pub fn status_of(&self, order_id: u64) -> Option<OrderStatus> {
        self.lock().orders.get(&order_id).map(|o| o.status)
    }
}

fn not_found(order_id: u64) -> ExchangeError {
    ExchangeError::OrderNotFound(format!("order {order_id}"))
}

#[async_trait]
impl ExchangeClient for SimExchange {
    async fn place_order(&self, order: &OrderRequest) -> ExchangeResult<PlacedOrder> {
        let mut state = self.lock();
        state.calls.place += 1;
        if let Some(Some(err)) = state.place_script.pop_front() {
            return Err(err);
        }

        let id = state.next_id;
        state.next_id += 1;
        let mut sim = SimOrder {
            request: order.clone(),
            status: OrderStatus::New,
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
        };
        if order.order_type == OrderType::Market {
            sim.fill(state.price);
        }
        let status = sim.status;
        state.orders.insert(id, sim);
        Ok(PlacedOrder {
            exchange_order_id: id,
            status,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> ExchangeResult<OrderStatus> {
        let mut state = self.lock();
        state.calls.cancel += 1;
        if let Some(err) = state.cancel_failures.pop_front() {
            return Err(err);
        }
        let price = state.price;
        let loses_race = state.fill_on_cancel.remove(&order_id);
        let order = state.orders.get_mut(&order_id).ok_or_else(|| not_found(order_id))?;
        if loses_race {
            order.fill(price);
            return Err(not_found(order_id));
        }
        if order.status.is_final() {
            return Err(not_found(order_id));
        }
        order.status = OrderStatus::Canceled;
        Ok(OrderStatus::Canceled)
    }

    async fn get_order_status(&self, _symbol: &str, order_id: u64) -> ExchangeResult<OrderReport> {
        let mut state = self.lock();
        state.calls.status += 1;
        let order = state.orders.get(&order_id).ok_or_else(|| not_found(order_id))?;
        Ok(OrderReport {
            status: order.status,
            filled_quantity: order.filled,
            avg_price: order.avg_price,
        })
    }

    async fn get_current_price(&self, _symbol: &str) -> ExchangeResult<Decimal> {
        let mut state = self.lock();
        state.calls.price += 1;
        match state.price_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state.price),
        }
    }
}

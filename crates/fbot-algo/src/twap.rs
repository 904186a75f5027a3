//! TWAP executor: splits a quantity into equal slices placed at a fixed
//! interval.
//!
//! Slice `i` is placed, then polled until terminal or the fill timeout;
//! then the executor waits `interval` before the next slice. A stop observed
//! before the last slice is placed ends the run CANCELLED and leaves placed
//! legs alone.

use std::time::Duration;

use fbot_core::enums::{PositionSide, RunStatus, Side};
use fbot_core::error::{ExchangeError, ValidationError};
use fbot_core::trading::OrderRequest;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::controller::{RunContext, Wait};
use crate::error::EngineResult;

/// Parameters of a TWAP run.
#[derive(Debug, Clone, PartialEq)]
pub struct TwapSpec {
    pub symbol: String,
    pub side: Side,
    pub total_quantity: Decimal,
    pub num_slices: u32,
    /// Wait between consecutive slices.
    pub interval: Duration,
    /// Place LIMIT slices at this price instead of MARKET.
    pub limit_price: Option<Decimal>,
    pub position_side: PositionSide,
}

impl TwapSpec {
    pub fn new(symbol: &str, side: Side, total_quantity: Decimal, num_slices: u32, interval: Duration) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            total_quantity,
            num_slices,
            interval,
            limit_price: None,
            position_side: PositionSide::Both,
        }
    }

    /// Spread `num_slices` evenly over `duration`.
    pub fn over_duration(symbol: &str, side: Side, total_quantity: Decimal, duration: Duration, num_slices: u32) -> Self {
        let interval = duration.checked_div(num_slices).unwrap_or(Duration::ZERO);
        Self::new(symbol, side, total_quantity, num_slices, interval)
    }

    pub fn with_limit_price(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = position_side;
        self
    }

    /// Validated slice quantities at `precision` decimal places.
    pub fn slice_quantities(&self, precision: u32) -> Result<Vec<Decimal>, ValidationError> {
        if let Some(price) = self.limit_price.filter(|p| *p <= Decimal::ZERO) {
            return Err(ValidationError::InvalidPriceRelationship(format!(
                "limit price {price} must be positive"
            )));
        }
        slice_quantities(self.total_quantity, self.num_slices, precision)
    }

    fn slice_order(&self, quantity: Decimal) -> OrderRequest {
        let order = match self.limit_price {
            Some(price) => OrderRequest::limit(&self.symbol, self.side, quantity, price),
            None => OrderRequest::market(&self.symbol, self.side, quantity),
        };
        order.with_position_side(self.position_side)
    }
}

/// Split `total` into `slices` parts: each rounded down to `precision`
/// decimal places, the last taking the remainder so the parts sum exactly.
/// `total` itself must fit in `precision` decimal places.
pub fn slice_quantities(total: Decimal, slices: u32, precision: u32) -> Result<Vec<Decimal>, ValidationError> {
    if slices == 0 {
        return Err(ValidationError::InvalidSliceCount(slices));
    }
    // Finer than the step size: the remainder slice would carry the extra digits.
    if total <= Decimal::ZERO || total.normalize().scale() > precision {
        return Err(ValidationError::InvalidQuantity(total));
    }

    let base = (total / Decimal::from(slices)).round_dp_with_strategy(precision, RoundingStrategy::ToZero);
    if slices > 1 && base <= Decimal::ZERO {
        return Err(ValidationError::InvalidQuantity(base));
    }

    let n = slices as usize;
    let mut parts = vec![base; n - 1];
    parts.push(total - base * Decimal::from(slices - 1));
    Ok(parts)
}

/// Place the first slice, then hand the run to its own task.
///
/// A network error on the first placement fails the run and is returned;
/// an exchange rejection is absorbed like any other rejected slice.
pub(crate) async fn launch(mut ctx: RunContext, spec: TwapSpec, slices: Vec<Decimal>) -> EngineResult<()> {
    let (first, placed) = ctx.submit(spec.slice_order(slices[0]), None).await;
    if let Err(e @ ExchangeError::Network(_)) = placed {
        ctx.finish(RunStatus::Failed, Some(format!("first slice: {e}")));
        return Err(e.into());
    }
    tokio::spawn(execute(ctx, spec, slices, first));
    Ok(())
}

async fn execute(mut ctx: RunContext, spec: TwapSpec, slices: Vec<Decimal>, first: usize) {
    ctx.await_fill(first).await;

    for (n, quantity) in slices.iter().enumerate().skip(1) {
        if ctx.pause(spec.interval).await == Wait::Cancelled {
            debug!(
                "[twap] run {} stopped before slice {}/{}",
                ctx.run_id(),
                n + 1,
                slices.len()
            );
            ctx.finish(RunStatus::Cancelled, None);
            return;
        }
        let (index, placed) = ctx.submit(spec.slice_order(*quantity), None).await;
        if placed.is_ok() {
            ctx.await_fill(index).await;
        }
    }

    if ctx.run.filled_quantity > Decimal::ZERO {
        ctx.finish(RunStatus::Completed, None);
    } else {
        ctx.finish(RunStatus::Failed, Some("no slice filled".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::controller::StrategyController;
    use crate::error::EngineError;
    use crate::events::{EngineEvent, EngineEventReceiver};
    use crate::sim::SimExchange;
    use fbot_core::config::EngineConfig;
    use fbot_core::enums::{LegState, OrderType};
    use rust_decimal_macros::dec;

    fn controller(sim: &Arc<SimExchange>) -> (StrategyController, EngineEventReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let config = EngineConfig {
            quantity_precision: 4,
            ..EngineConfig::default()
        };
        (StrategyController::new(sim.clone(), Arc::new(tx), config), rx)
    }

    fn btc(total: Decimal, slices: u32, interval_secs: u64) -> TwapSpec {
        TwapSpec::new("BTCUSDT", Side::Buy, total, slices, Duration::from_secs(interval_secs))
    }

    // -- slicing --------------------------------------------------------------

    #[test]
    fn slices_round_down_and_last_takes_remainder() {
        let parts = slice_quantities(dec!(0.01), 3, 4).unwrap();
        assert_eq!(parts, vec![dec!(0.0033), dec!(0.0033), dec!(0.0034)]);
        assert_eq!(parts.iter().sum::<Decimal>(), dec!(0.01));
    }

    #[test]
    fn slice_sum_is_exact_for_uneven_splits() {
        for (total, n) in [(dec!(1), 7), (dec!(0.123), 5), (dec!(2.5), 1), (dec!(10), 3)] {
            let parts = slice_quantities(total, n, 3).unwrap();
            assert_eq!(parts.len(), n as usize);
            assert_eq!(parts.iter().sum::<Decimal>(), total);
            assert!(parts.iter().all(|q| *q > Decimal::ZERO));
        }
    }

    #[test]
    fn invalid_slicing_is_rejected() {
        assert_eq!(slice_quantities(dec!(1), 0, 3), Err(ValidationError::InvalidSliceCount(0)));
        assert_eq!(slice_quantities(dec!(0), 2, 3), Err(ValidationError::InvalidQuantity(dec!(0))));
        assert!(matches!(
            slice_quantities(dec!(0.001), 5, 3),
            Err(ValidationError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn total_finer_than_precision_is_rejected() {
        assert_eq!(
            slice_quantities(dec!(0.0105), 3, 3),
            Err(ValidationError::InvalidQuantity(dec!(0.0105)))
        );
        // Trailing zeros do not count.
        assert!(slice_quantities(dec!(0.0100), 2, 2).is_ok());
    }

    #[test]
    fn over_duration_divides_interval() {
        let spec = TwapSpec::over_duration("BTCUSDT", Side::Sell, dec!(1), Duration::from_secs(600), 4);
        assert_eq!(spec.interval, Duration::from_secs(150));
        assert_eq!(spec.num_slices, 4);
    }

    // -- execution ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn all_slices_fill_and_run_completes() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        let mut handle = ctl.start_twap(btc(dec!(0.01), 3, 60)).await.unwrap();
        let run = handle.wait().await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.legs.len(), 3);
        let quantities: Vec<Decimal> = run.legs.iter().map(|l| l.quantity).collect();
        assert_eq!(quantities, vec![dec!(0.0033), dec!(0.0033), dec!(0.0034)]);
        assert_eq!(run.filled_quantity, dec!(0.01));
        assert_eq!(run.avg_fill_price, dec!(50000));
        assert!(run.legs.iter().all(|l| l.order_type == OrderType::Market));
    }

    #[tokio::test(start_paused = true)]
    async fn average_price_weights_each_slice() {
        let sim = Arc::new(SimExchange::new(dec!(100)));
        let (ctl, _rx) = controller(&sim);
        let handle = ctl.start_twap(btc(dec!(2), 2, 60)).await.unwrap();
        sim.set_price(dec!(200));
        let run = ctl.wait(handle.run_id()).await.unwrap();
        assert_eq!(run.filled_quantity, dec!(2));
        assert_eq!(run.avg_fill_price, dec!(150));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_wait_cancels_before_next_slice() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        let handle = ctl.start_twap(btc(dec!(0.01), 3, 60)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        ctl.stop(handle.run_id()).unwrap();
        let run = ctl.wait(handle.run_id()).await.unwrap();

        assert_eq!(run.status, RunStatus::Cancelled);
        assert_eq!(run.legs.len(), 1);
        assert_eq!(run.legs[0].state, LegState::Filled);
        assert_eq!(sim.calls().place, 1);
        assert_eq!(sim.calls().cancel, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_polling_a_resting_slice_cancels_promptly() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        let spec = btc(dec!(0.003), 3, 60).with_limit_price(dec!(40000));
        let started = tokio::time::Instant::now();
        let handle = ctl.start_twap(spec).await.unwrap();

        // Inside the fill poll of the first slice, well before the 60 s timeout.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(ctl.get_status(handle.run_id()).unwrap().status, RunStatus::Running);
        ctl.stop(handle.run_id()).unwrap();
        let run = ctl.wait(handle.run_id()).await.unwrap();

        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(run.legs.len(), 1);
        assert_eq!(run.legs[0].state, LegState::Submitted);
        assert_eq!(sim.calls().place, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_slice_is_skipped() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, mut rx) = controller(&sim);
        sim.fail_next_place(ExchangeError::Rejected {
            code: -2019,
            reason: "Margin is insufficient.".into(),
        });
        let mut handle = ctl.start_twap(btc(dec!(0.003), 3, 5)).await.unwrap();
        let run = handle.wait().await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.legs[0].state, LegState::Rejected);
        assert_eq!(run.legs[0].exchange_order_id, None);
        assert_eq!(run.filled_quantity, dec!(0.002));
        assert_eq!(run.remaining_quantity(), dec!(0.001));

        let mut rejected = false;
        while let Ok(event) = rx.try_recv() {
            rejected |= matches!(event, EngineEvent::LegRejected { leg_id: 1, .. });
        }
        assert!(rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fills_end_failed() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        for _ in 0..2 {
            sim.fail_next_place(ExchangeError::Rejected {
                code: -4164,
                reason: "notional too small".into(),
            });
        }
        let mut handle = ctl.start_twap(btc(dec!(0.002), 2, 5)).await.unwrap();
        let run = handle.wait().await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_on_first_slice_is_surfaced() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        sim.fail_next_place(ExchangeError::Network("connection reset".into()));

        let err = ctl.start_twap(btc(dec!(0.01), 3, 60)).await.unwrap_err();
        assert!(matches!(err, EngineError::Exchange(ExchangeError::Network(_))));

        let runs = ctl.list();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(sim.calls().place, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn limit_slices_wait_for_fill_timeout() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, mut rx) = controller(&sim);
        let spec = btc(dec!(0.002), 2, 5).with_limit_price(dec!(40000));
        let mut handle = ctl.start_twap(spec).await.unwrap();
        let run = handle.wait().await;

        // Resting limit orders never fill in the simulator.
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.legs.iter().all(|l| l.state == LegState::Submitted));
        assert!(run.legs.iter().all(|l| l.price == Some(dec!(40000))));

        let mut timeouts = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::FillTimeout { .. }) {
                timeouts += 1;
            }
        }
        assert_eq!(timeouts, 2);
    }

    #[tokio::test]
    async fn validation_happens_before_any_call() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        let err = ctl.start_twap(btc(dec!(1), 0, 5)).await.unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::InvalidSliceCount(0)));
        assert!(ctl.list().is_empty());
        assert_eq!(sim.calls().total(), 0);
    }
}

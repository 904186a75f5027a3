//! Grid executor: resting limit orders on evenly spaced price levels.
//!
//! ```text
//!  level   9  SELL ┐
//!          …       │ above current price
//!          5  SELL ┘
//!          4  ---- closest to current price: left empty
//!          3  BUY  ┐
//!          …       │ below current price
//!          0  BUY  ┘
//! ```
//!
//! A filled BUY at level `i` re-arms as a SELL at `i + 1`; a filled SELL at
//! `i` re-arms as a BUY at `i - 1`. A level holds at most one live leg. The
//! grid runs until stopped, then cancels every live leg once.

use fbot_core::enums::{LegState, PositionSide, RunStatus, Side};
use fbot_core::error::ValidationError;
use fbot_core::trading::OrderRequest;
use rust_decimal::Decimal;
use tracing::debug;

use crate::controller::{RunContext, Wait};
use crate::events::EngineEvent;
use crate::leg::LegId;
use crate::run::GridLevel;

/// Parameters of a grid run.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    pub symbol: String,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub num_levels: u32,
    pub quantity_per_order: Decimal,
    /// Both directions of the grid trade this position side.
    pub position_side: PositionSide,
}

impl GridSpec {
    pub fn new(symbol: &str, lower_price: Decimal, upper_price: Decimal, num_levels: u32, quantity_per_order: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            lower_price,
            upper_price,
            num_levels,
            quantity_per_order,
            position_side: PositionSide::Both,
        }
    }

    pub fn with_position_side(mut self, position_side: PositionSide) -> Self {
        self.position_side = position_side;
        self
    }

    /// Validated level prices at `precision` decimal places.
    pub fn level_prices(&self, precision: u32) -> Result<Vec<Decimal>, ValidationError> {
        if self.quantity_per_order <= Decimal::ZERO {
            return Err(ValidationError::InvalidQuantity(self.quantity_per_order));
        }
        level_prices(self.lower_price, self.upper_price, self.num_levels, precision)
    }
}

/// `lower + i·(upper − lower)/(n − 1)`, rounded; the ends are the bounds.
pub fn level_prices(lower: Decimal, upper: Decimal, num_levels: u32, precision: u32) -> Result<Vec<Decimal>, ValidationError> {
    if num_levels < 2 {
        return Err(ValidationError::InvalidGridRange(format!(
            "need at least 2 levels, got {num_levels}"
        )));
    }
    if lower <= Decimal::ZERO || upper <= lower {
        return Err(ValidationError::InvalidGridRange(format!(
            "upper {upper} must be above lower {lower} (both positive)"
        )));
    }

    let last = num_levels - 1;
    let step = (upper - lower) / Decimal::from(last);
    let prices = (0..num_levels)
        .map(|i| match i {
            0 => lower,
            i if i == last => upper,
            i => (lower + step * Decimal::from(i)).round_dp(precision),
        })
        .collect();
    Ok(prices)
}

pub(crate) fn levels(prices: &[Decimal]) -> Vec<GridLevel> {
    prices
        .iter()
        .enumerate()
        .map(|(level_index, price)| GridLevel {
            level_index,
            price: *price,
            active_leg_id: None,
        })
        .collect()
}

/// Index of the level nearest `current` (lower index on a tie).
pub fn closest_level(prices: &[Decimal], current: Decimal) -> usize {
    prices
        .iter()
        .enumerate()
        .min_by_key(|(_, price)| (**price - current).abs())
        .map_or(0, |(i, _)| i)
}

/// Level a fill at `level` re-arms onto, if it lies inside the grid.
pub fn rearm_target(level: usize, filled_side: Side, num_levels: usize) -> Option<usize> {
    match filled_side {
        Side::Buy => Some(level + 1).filter(|t| *t < num_levels),
        Side::Sell => level.checked_sub(1),
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub(crate) async fn execute(mut ctx: RunContext, spec: GridSpec, current: Decimal) {
    let prices: Vec<Decimal> = ctx.run.levels.iter().map(|l| l.price).collect();
    let skip = closest_level(&prices, current);
    debug!(
        "[grid] run {} current {current}, leaving level {skip} ({}) empty",
        ctx.run_id(),
        prices[skip]
    );

    let mut accepted = 0usize;
    for (level, price) in prices.iter().enumerate() {
        if level == skip {
            continue;
        }
        if ctx.is_cancelled() {
            break;
        }
        let side = if *price < current { Side::Buy } else { Side::Sell };
        if place_on_level(&mut ctx, &spec, level, side).await {
            accepted += 1;
        }
    }

    if !ctx.is_cancelled() && accepted == 0 {
        ctx.finish(RunStatus::Failed, Some("no initial grid order was accepted".to_string()));
        return;
    }

    let poll = ctx.config.grid_poll_interval();
    loop {
        if ctx.pause(poll).await == Wait::Cancelled {
            break;
        }
        poll_levels(&mut ctx, &spec).await;
    }

    cancel_live_legs(&mut ctx).await;
    ctx.finish(RunStatus::Cancelled, None);
}

/// Place a limit order on `level` and mark the level occupied on success.
async fn place_on_level(ctx: &mut RunContext, spec: &GridSpec, level: usize, side: Side) -> bool {
    let price = ctx.run.levels[level].price;
    let request = OrderRequest::limit(&spec.symbol, side, spec.quantity_per_order, price)
        .with_position_side(spec.position_side);
    let (index, placed) = ctx.submit(request, Some(level)).await;
    if placed.is_err() {
        return false;
    }
    ctx.run.levels[level].active_leg_id = Some(ctx.run.legs[index].leg_id);
    ctx.run.total_quantity += spec.quantity_per_order;
    ctx.publish();
    true
}

fn leg_index(ctx: &RunContext, leg_id: LegId) -> Option<usize> {
    ctx.run.legs.iter().position(|l| l.leg_id == leg_id)
}

/// Refresh every active leg and free the levels of closed ones, then re-arm
/// the fills. Freeing first lets adjacent fills from one poll re-arm onto
/// each other's levels.
async fn poll_levels(ctx: &mut RunContext, spec: &GridSpec) {
    let active: Vec<(usize, LegId)> = ctx
        .run
        .levels
        .iter()
        .filter_map(|l| l.active_leg_id.map(|id| (l.level_index, id)))
        .collect();

    let mut fills: Vec<(usize, Side)> = Vec::new();
    for (level, leg_id) in active {
        if ctx.is_cancelled() {
            return;
        }
        let Some(index) = leg_index(ctx, leg_id) else {
            continue;
        };
        match ctx.refresh(index).await {
            LegState::Filled => {
                ctx.run.levels[level].active_leg_id = None;
                fills.push((level, ctx.run.legs[index].side));
            }
            LegState::Rejected | LegState::Cancelled => {
                debug!("[grid] run {} level {level} cleared, leg {leg_id} closed unfilled", ctx.run_id());
                ctx.run.levels[level].active_leg_id = None;
            }
            _ => {}
        }
    }
    ctx.publish();

    for (level, side) in fills {
        rearm(ctx, spec, level, side).await;
    }
}

async fn rearm(ctx: &mut RunContext, spec: &GridSpec, filled_level: usize, filled_side: Side) {
    let run_id = ctx.run_id();
    let skipped = |reason: String| EngineEvent::RearmSkipped {
        run_id,
        filled_level,
        reason,
    };

    let Some(target) = rearm_target(filled_level, filled_side, ctx.run.levels.len()) else {
        ctx.logger().record(skipped("next level is outside the grid".to_string()));
        return;
    };
    if let Some(occupant) = ctx.run.levels[target].active_leg_id {
        ctx.logger().record(skipped(format!("level {target} occupied by leg {occupant}")));
        return;
    }
    if ctx.is_cancelled() {
        return;
    }

    let side = filled_side.opposite();
    if place_on_level(ctx, spec, target, side).await {
        ctx.logger().record(EngineEvent::GridRearmed {
            run_id,
            filled_level,
            level: target,
            side,
        });
    }
}

/// One cancel per live leg; legs already terminal are left alone.
async fn cancel_live_legs(ctx: &mut RunContext) {
    for index in 0..ctx.run.legs.len() {
        if !ctx.run.legs[index].is_live() {
            continue;
        }
        ctx.cancel(index).await;
        let leg = &ctx.run.legs[index];
        if let (true, Some(level)) = (leg.is_terminal(), leg.level) {
            let slot = &mut ctx.run.levels[level].active_leg_id;
            if *slot == Some(leg.leg_id) {
                *slot = None;
            }
        }
    }
    ctx.publish();
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::controller::StrategyController;
    use crate::error::EngineError;
    use crate::events::EngineEventReceiver;
    use crate::run::{RunHandle, StrategyRun};
    use crate::sim::SimExchange;
    use fbot_core::config::EngineConfig;
    use fbot_core::enums::OrderStatus;
    use fbot_core::error::ExchangeError;
    use rust_decimal_macros::dec;

    const POLL: Duration = Duration::from_millis(5000);

    fn controller(sim: &Arc<SimExchange>) -> (StrategyController, EngineEventReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (StrategyController::new(sim.clone(), Arc::new(tx), EngineConfig::default()), rx)
    }

    fn ten_levels() -> GridSpec {
        GridSpec::new("BTCUSDT", dec!(45000), dec!(55000), 10, dec!(0.001))
    }

    /// Let the executor run up to its next wait.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn order_at(run: &StrategyRun, level: usize) -> u64 {
        let leg_id = run.levels[level].active_leg_id.unwrap();
        run.leg(leg_id).unwrap().exchange_order_id.unwrap()
    }

    async fn started(ctl: &StrategyController) -> RunHandle {
        let handle = ctl.start_grid(ten_levels()).await.unwrap();
        settle().await;
        handle
    }

    // -- level arithmetic -----------------------------------------------------

    #[test]
    fn ten_levels_between_45000_and_55000() {
        let prices = level_prices(dec!(45000), dec!(55000), 10, 2).unwrap();
        assert_eq!(
            prices,
            vec![
                dec!(45000),
                dec!(46111.11),
                dec!(47222.22),
                dec!(48333.33),
                dec!(49444.44),
                dec!(50555.56),
                dec!(51666.67),
                dec!(52777.78),
                dec!(53888.89),
                dec!(55000),
            ]
        );
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(
            level_prices(dec!(55000), dec!(45000), 10, 2),
            Err(ValidationError::InvalidGridRange(_))
        ));
        assert!(matches!(
            level_prices(dec!(45000), dec!(45000), 10, 2),
            Err(ValidationError::InvalidGridRange(_))
        ));
        assert!(matches!(
            level_prices(dec!(45000), dec!(55000), 1, 2),
            Err(ValidationError::InvalidGridRange(_))
        ));
        let spec = GridSpec::new("BTCUSDT", dec!(45000), dec!(55000), 10, dec!(0));
        assert_eq!(spec.level_prices(2), Err(ValidationError::InvalidQuantity(dec!(0))));
    }

    #[test]
    fn closest_level_prefers_lower_on_tie() {
        let prices = [dec!(100), dec!(200), dec!(300)];
        assert_eq!(closest_level(&prices, dec!(210)), 1);
        assert_eq!(closest_level(&prices, dec!(250)), 1);
        assert_eq!(closest_level(&prices, dec!(10)), 0);
        assert_eq!(closest_level(&prices, dec!(999)), 2);
    }

    #[test]
    fn rearm_targets_stay_inside_the_grid() {
        assert_eq!(rearm_target(3, Side::Buy, 10), Some(4));
        assert_eq!(rearm_target(3, Side::Sell, 10), Some(2));
        assert_eq!(rearm_target(9, Side::Buy, 10), None);
        assert_eq!(rearm_target(0, Side::Sell, 10), None);
    }

    // -- execution ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn initial_orders_straddle_current_price() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, _rx) = controller(&sim);
        let handle = started(&ctl).await;
        let run = handle.status();

        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.legs.len(), 9);
        assert_eq!(run.levels[4].active_leg_id, None);
        for level in 0..4 {
            let leg = run.leg(run.levels[level].active_leg_id.unwrap()).unwrap();
            assert_eq!(leg.side, Side::Buy);
            assert_eq!(leg.price, Some(run.levels[level].price));
        }
        for level in 5..10 {
            let leg = run.leg(run.levels[level].active_leg_id.unwrap()).unwrap();
            assert_eq!(leg.side, Side::Sell);
        }
        assert_eq!(run.total_quantity, dec!(0.009));
    }

    #[tokio::test(start_paused = true)]
    async fn filled_buy_rearms_one_sell_above() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, _rx) = controller(&sim);
        let handle = started(&ctl).await;
        let before = handle.status();
        let filled_leg = before.levels[3].active_leg_id.unwrap();

        sim.fill(order_at(&before, 3));
        tokio::time::sleep(POLL).await;

        let run = handle.status();
        assert_eq!(run.legs.len(), 10);
        assert_eq!(run.leg(filled_leg).unwrap().state, LegState::Filled);
        assert_eq!(run.levels[3].active_leg_id, None);

        let new_leg = run.leg(run.levels[4].active_leg_id.unwrap()).unwrap();
        assert_eq!(new_leg.side, Side::Sell);
        assert_eq!(new_leg.price, Some(dec!(49444.44)));
        assert_eq!(new_leg.level, Some(4));
        assert_eq!(sim.calls().place, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn occupied_target_level_skips_rearm() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, mut rx) = controller(&sim);
        let handle = started(&ctl).await;

        sim.fill(order_at(&handle.status(), 3));
        tokio::time::sleep(POLL).await;
        let run = handle.status();
        assert!(run.levels[4].active_leg_id.is_some());

        sim.fill(order_at(&run, 5));
        tokio::time::sleep(POLL).await;
        let run = handle.status();
        assert_eq!(run.legs.len(), 10);
        assert_eq!(run.levels[5].active_leg_id, None);

        let mut skipped = false;
        while let Ok(event) = rx.try_recv() {
            skipped |= matches!(event, EngineEvent::RearmSkipped { filled_level: 5, .. });
        }
        assert!(skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn adjacent_fills_in_one_poll_both_rearm() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, mut rx) = controller(&sim);
        let handle = started(&ctl).await;
        let before = handle.status();

        sim.fill(order_at(&before, 2));
        sim.fill(order_at(&before, 3));
        tokio::time::sleep(POLL).await;

        let run = handle.status();
        assert_eq!(run.legs.len(), 11);
        assert_eq!(run.levels[2].active_leg_id, None);
        let at_3 = run.leg(run.levels[3].active_leg_id.unwrap()).unwrap();
        assert_eq!((at_3.side, at_3.state), (Side::Sell, LegState::Submitted));
        let at_4 = run.leg(run.levels[4].active_leg_id.unwrap()).unwrap();
        assert_eq!((at_4.side, at_4.state), (Side::Sell, LegState::Submitted));

        let mut rearms = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(!matches!(event, EngineEvent::RearmSkipped { .. }));
            if matches!(event, EngineEvent::GridRearmed { .. }) {
                rearms += 1;
            }
        }
        assert_eq!(rearms, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn externally_cancelled_leg_clears_its_level() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, _rx) = controller(&sim);
        let handle = started(&ctl).await;

        sim.set_status(order_at(&handle.status(), 7), OrderStatus::Canceled);
        tokio::time::sleep(POLL).await;
        let run = handle.status();
        assert_eq!(run.levels[7].active_leg_id, None);
        assert_eq!(run.legs.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_each_live_leg_once() {
        let sim = Arc::new(SimExchange::new(dec!(49400)));
        let (ctl, _rx) = controller(&sim);
        let handle = started(&ctl).await;

        sim.fill(order_at(&handle.status(), 0));
        ctl.stop(handle.run_id()).unwrap();
        ctl.stop(handle.run_id()).unwrap();
        let run = ctl.wait(handle.run_id()).await.unwrap();

        assert_eq!(run.status, RunStatus::Cancelled);
        // Leg 0 filled on the exchange: its cancel finds nothing to cancel.
        assert_eq!(sim.calls().cancel, 9);
        assert_eq!(run.legs.iter().filter(|l| l.state == LegState::Cancelled).count(), 8);
        assert_eq!(run.legs.iter().filter(|l| l.state == LegState::Filled).count(), 1);
        assert!(run.levels.iter().all(|l| l.active_leg_id.is_none()));

        ctl.stop(handle.run_id()).unwrap();
        settle().await;
        assert_eq!(sim.calls().cancel, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn all_initial_placements_failing_fails_the_run() {
        let sim = Arc::new(SimExchange::new(dec!(49100)));
        let (ctl, _rx) = controller(&sim);
        sim.fail_next_place(ExchangeError::Rejected {
            code: -2019,
            reason: "Margin is insufficient.".into(),
        });
        let spec = GridSpec::new("BTCUSDT", dec!(49000), dec!(51000), 2, dec!(0.001));
        let handle = ctl.start_grid(spec).await.unwrap();
        let run = ctl.wait(handle.run_id()).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.legs.len(), 1);
        assert_eq!(run.legs[0].state, LegState::Rejected);
    }

    #[tokio::test]
    async fn price_failure_surfaces_without_a_run() {
        let sim = Arc::new(SimExchange::new(dec!(50000)));
        let (ctl, _rx) = controller(&sim);
        sim.fail_next_price(ExchangeError::Network("timeout".into()));

        let err = ctl.start_grid(ten_levels()).await.unwrap_err();
        assert_eq!(err, EngineError::Exchange(ExchangeError::Network("timeout".into())));
        assert!(ctl.list().is_empty());
        assert_eq!(sim.calls().place, 0);
    }
}

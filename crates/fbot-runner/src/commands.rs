//! Command execution. Results are printed to stdout as pretty JSON; progress
//! goes to the log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fbot_algo::{
    GridSpec, OcoPair, OcoPrices, OcoRequest, RunHandle, StrategyController, StrategyRun, TracingLogger, TwapSpec,
};
use fbot_core::config::EngineConfig;
use fbot_core::enums::{PositionSide, RunStatus};
use fbot_core::trading::OrderRequest;
use fbot_td::ExchangeClient;
use fbot_td::binance::BinanceFutures;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{Command, OcoArgs};

pub async fn run(
    command: Command,
    exchange: Arc<BinanceFutures>,
    engine: EngineConfig,
    position_side: PositionSide,
) -> Result<()> {
    match command {
        Command::Market { symbol, side, quantity } => {
            place(&exchange, OrderRequest::market(&symbol, side, quantity).with_position_side(position_side)).await
        }
        Command::Limit {
            symbol,
            side,
            quantity,
            price,
            tif,
        } => {
            let request = OrderRequest::limit(&symbol, side, quantity, price)
                .with_time_in_force(tif)
                .with_position_side(position_side);
            place(&exchange, request).await
        }
        Command::StopLimit {
            symbol,
            side,
            quantity,
            stop_price,
            limit_price,
        } => {
            let request = OrderRequest::stop_limit(&symbol, side, quantity, stop_price, limit_price)
                .with_position_side(position_side);
            place(&exchange, request).await
        }
        Command::Cancel { symbol, order_id } => {
            let status = exchange.cancel_order(&symbol, order_id).await?;
            info!("order {order_id} on {symbol}: {status:?}");
            print_json(&serde_json::json!({ "symbol": symbol, "order_id": order_id, "status": status }))
        }
        Command::Status { symbol, order_id } => print_json(&exchange.order_details(&symbol, order_id).await?),
        Command::OpenOrders { symbol } => print_json(&exchange.open_orders(symbol.as_deref()).await?),
        Command::Modify {
            symbol,
            order_id,
            price,
            quantity,
            stop_price,
        } => {
            if price.is_none() && quantity.is_none() && stop_price.is_none() {
                bail!("nothing to modify: pass --price, --quantity or --stop-price");
            }
            let placed = exchange
                .replace_order(&symbol, order_id, price, quantity, stop_price)
                .await?;
            info!("order {order_id} replaced by {}", placed.exchange_order_id);
            print_json(&placed)
        }
        Command::Oco(args) => run_oco(exchange, engine, args, position_side).await,
        Command::Twap {
            symbol,
            side,
            quantity,
            duration_min,
            slices,
            limit_price,
        } => {
            let duration = Duration::from_secs(duration_min * 60);
            let mut spec =
                TwapSpec::over_duration(&symbol, side, quantity, duration, slices).with_position_side(position_side);
            if let Some(price) = limit_price {
                spec = spec.with_limit_price(price);
            }
            let controller = controller(exchange, engine);
            let handle = controller.start_twap(spec).await?;
            follow_run(&controller, handle).await
        }
        Command::Grid {
            symbol,
            lower,
            upper,
            levels,
            quantity,
        } => {
            let controller = controller(exchange, engine);
            let handle = controller
                .start_grid(GridSpec::new(&symbol, lower, upper, levels, quantity).with_position_side(position_side))
                .await?;
            follow_run(&controller, handle).await
        }
    }
}

fn controller(exchange: Arc<BinanceFutures>, engine: EngineConfig) -> StrategyController {
    StrategyController::new(exchange, Arc::new(TracingLogger), engine)
}

async fn place(exchange: &BinanceFutures, request: OrderRequest) -> Result<()> {
    let placed = exchange.place_order(&request).await?;
    info!(
        "{} {} {} {} placed as order {} ({:?})",
        request.symbol, request.side, request.order_type, request.quantity, placed.exchange_order_id, placed.status
    );
    print_json(&serde_json::json!({ "request": request, "order": placed }))
}

/// Wait for a run to finish, stopping it on Ctrl+C, then print the final
/// snapshot.
async fn follow_run(controller: &StrategyController, mut handle: RunHandle) -> Result<()> {
    let run_id = handle.run_id();
    info!("run {run_id} started — press Ctrl+C to stop");

    let run: StrategyRun = tokio::select! {
        run = handle.wait() => run,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("shutdown signal received — stopping run {run_id}");
            controller.stop(run_id)?;
            controller.wait(run_id).await?
        }
    };

    print_json(&run)?;
    if run.status == RunStatus::Failed {
        bail!("run {run_id} failed: {}", run.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}

async fn run_oco(
    exchange: Arc<BinanceFutures>,
    engine: EngineConfig,
    args: OcoArgs,
    position_side: PositionSide,
) -> Result<()> {
    let prices = match (args.tp_pct, args.sl_pct) {
        (Some(tp_pct), Some(sl_pct)) => {
            let current = exchange.get_current_price(&args.symbol).await?;
            let prices = OcoPrices::from_percentages(args.side, current, tp_pct, sl_pct, engine.price_precision)?;
            info!(
                "{} @ {current}: take-profit {}, stop {}, stop-limit {}",
                args.symbol, prices.take_profit, prices.stop, prices.stop_limit
            );
            prices
        }
        _ => OcoPrices {
            take_profit: args.take_profit.context("take-profit price is required")?,
            stop: args.stop.context("stop price is required")?,
            stop_limit: args.stop_limit.context("stop-limit price is required")?,
        },
    };
    let request = OcoRequest::new(&args.symbol, args.side, args.quantity, prices).with_position_side(position_side);

    let oco = controller(exchange, engine).oco();
    let pair = oco.place_oco(&request).await?;
    if args.detach {
        warn!("OCO {} detached: legs are not linked on the exchange", pair.group_id);
        return print_json(&pair);
    }

    let group_id = pair.group_id;
    info!("supervising OCO {group_id} — press Ctrl+C to cancel both legs");
    let (stop, stop_rx) = watch::channel(false);
    let supervision = oco.supervise(pair, stop_rx);
    tokio::pin!(supervision);

    let pair: OcoPair = tokio::select! {
        pair = &mut supervision => pair,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("shutdown signal received — cancelling OCO {group_id}");
            stop.send_replace(true);
            supervision.await
        }
    };
    print_json(&pair)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

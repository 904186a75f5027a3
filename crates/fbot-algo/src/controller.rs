//! Strategy controller: starts runs, tracks them, and stops them.
//!
//! # Architecture
//!
//! ```text
//!  start_twap / start_grid
//!        │ validate, open run
//!        ▼
//!  ┌──────────────┐  snapshot (watch)  ┌────────────────────┐
//!  │ executor task│ ─────────────────→ │ registry           │ ← get_status / list / wait
//!  │ (RunContext) │ ←───────────────── │ run_id → RunEntry  │ ← stop
//!  └──────────────┘   stop flag (watch)└────────────────────┘
//! ```
//!
//! Each run executes on its own tokio task and owns its [`StrategyRun`]. The
//! registry only holds the two channel ends, so its mutex is never held across
//! an await. Every wait inside an executor races the stop flag, which makes
//! `stop` take effect at the next suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fbot_core::config::EngineConfig;
use fbot_core::enums::{LegState, RunStatus, StrategyKind};
use fbot_core::error::ExchangeError;
use fbot_core::time_util::now_ms;
use fbot_core::trading::OrderRequest;
use fbot_td::ExchangeClient;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventLogger};
use crate::grid::{self, GridSpec};
use crate::leg::{CancelOutcome, LegId, LegOps, OrderLeg};
use crate::oco::OcoCoordinator;
use crate::run::{RunHandle, RunId, StrategyRun, wait_terminal};
use crate::twap::{self, TwapSpec};

/// Registry entry: the controller's view of one run.
struct RunEntry {
    snapshot: watch::Receiver<StrategyRun>,
    stop: watch::Sender<bool>,
}

/// Owns the registry of TWAP and grid runs.
pub struct StrategyController {
    exchange: Arc<dyn ExchangeClient>,
    logger: Arc<dyn EventLogger>,
    config: EngineConfig,
    registry: Mutex<HashMap<RunId, RunEntry>>,
}

impl StrategyController {
    pub fn new(exchange: Arc<dyn ExchangeClient>, logger: Arc<dyn EventLogger>, config: EngineConfig) -> Self {
        Self {
            exchange,
            logger,
            config,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// OCO coordinator sharing this controller's exchange, logger and config.
    pub fn oco(&self) -> OcoCoordinator {
        OcoCoordinator::new(self.exchange.clone(), self.logger.clone(), self.config.clone())
    }

    // -----------------------------------------------------------------------
    // Starting runs
    // -----------------------------------------------------------------------

    /// Start a TWAP run. The first slice is placed before this returns; a
    /// network error on it is returned here and the run is recorded FAILED.
    pub async fn start_twap(&self, spec: TwapSpec) -> EngineResult<RunHandle> {
        let slices = spec.slice_quantities(self.config.quantity_precision)?;
        let ctx = self.open_run(StrategyKind::Twap, &spec.symbol, spec.total_quantity);
        let handle = ctx.handle();
        twap::launch(ctx, spec, slices).await?;
        Ok(handle)
    }

    /// Start a grid run. Fails without registering a run when the current
    /// price cannot be fetched.
    pub async fn start_grid(&self, spec: GridSpec) -> EngineResult<RunHandle> {
        let prices = spec.level_prices(self.config.price_precision)?;
        let current = self.exchange.get_current_price(&spec.symbol).await?;
        let mut ctx = self.open_run(StrategyKind::Grid, &spec.symbol, Decimal::ZERO);
        ctx.run.levels = grid::levels(&prices);
        ctx.publish();
        let handle = ctx.handle();
        tokio::spawn(grid::execute(ctx, spec, current));
        Ok(handle)
    }

    fn open_run(&self, kind: StrategyKind, symbol: &str, total_quantity: Decimal) -> RunContext {
        let run_id = Uuid::new_v4();
        let run = StrategyRun::new(run_id, kind, symbol, total_quantity, now_ms());
        let (publisher, snapshot) = watch::channel(run.clone());
        let (stop, cancel) = watch::channel(false);

        self.lock().insert(run_id, RunEntry { snapshot, stop });
        self.logger.record(EngineEvent::RunStarted {
            run_id,
            kind,
            symbol: symbol.to_string(),
        });

        RunContext {
            run,
            publisher,
            cancel,
            exchange: self.exchange.clone(),
            logger: self.logger.clone(),
            config: self.config.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Control and inspection
    // -----------------------------------------------------------------------

    /// Request a run to stop. Idempotent; a no-op on terminal runs.
    pub fn stop(&self, run_id: RunId) -> EngineResult<()> {
        let registry = self.lock();
        let entry = registry.get(&run_id).ok_or(EngineError::RunNotFound(run_id))?;
        if entry.snapshot.borrow().status.is_terminal() {
            debug!("[controller] stop on finished run {run_id} ignored");
            return Ok(());
        }
        if !entry.stop.send_replace(true) {
            self.logger.record(EngineEvent::StopRequested { run_id });
        }
        Ok(())
    }

    /// Snapshot of a run.
    pub fn get_status(&self, run_id: RunId) -> EngineResult<StrategyRun> {
        self.lock()
            .get(&run_id)
            .map(|entry| entry.snapshot.borrow().clone())
            .ok_or(EngineError::RunNotFound(run_id))
    }

    /// Snapshots of every run, oldest first.
    pub fn list(&self) -> Vec<StrategyRun> {
        let mut runs: Vec<StrategyRun> = self
            .lock()
            .values()
            .map(|entry| entry.snapshot.borrow().clone())
            .collect();
        runs.sort_by_key(|run| run.started_at);
        runs
    }

    /// Wait until a run is terminal and return its final snapshot.
    pub async fn wait(&self, run_id: RunId) -> EngineResult<StrategyRun> {
        let mut rx = self
            .lock()
            .get(&run_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or(EngineError::RunNotFound(run_id))?;
        Ok(wait_terminal(&mut rx).await)
    }

    /// Stop every running run and wait for all of them to finish.
    pub async fn shutdown(&self) -> Vec<StrategyRun> {
        let receivers: Vec<(RunId, watch::Receiver<StrategyRun>)> = self
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.snapshot.clone()))
            .collect();

        for (run_id, _) in &receivers {
            // Only fails for unknown IDs, and these came from the registry.
            let _ = self.stop(*run_id);
        }

        let mut finished = Vec::with_capacity(receivers.len());
        for (_, mut rx) in receivers {
            finished.push(wait_terminal(&mut rx).await);
        }
        finished
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RunId, RunEntry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Executor context
// ---------------------------------------------------------------------------

/// Result of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Elapsed,
    Cancelled,
}

/// Sleep for `duration` unless the stop flag is (or becomes) set. A closed
/// flag channel counts as a stop: nobody is left to observe the run.
pub(crate) async fn cancellable_sleep(stop: &mut watch::Receiver<bool>, duration: Duration) -> Wait {
    if *stop.borrow() {
        return Wait::Cancelled;
    }
    tokio::select! {
        _ = stop.wait_for(|stopped| *stopped) => Wait::Cancelled,
        _ = tokio::time::sleep(duration) => Wait::Elapsed,
    }
}

/// Everything an executor task needs: the live run, the channel ends, and
/// the shared exchange and logger.
pub(crate) struct RunContext {
    pub run: StrategyRun,
    publisher: watch::Sender<StrategyRun>,
    cancel: watch::Receiver<bool>,
    exchange: Arc<dyn ExchangeClient>,
    logger: Arc<dyn EventLogger>,
    pub config: EngineConfig,
}

impl RunContext {
    pub fn run_id(&self) -> RunId {
        self.run.run_id
    }

    pub fn handle(&self) -> RunHandle {
        RunHandle::new(self.run.run_id, self.publisher.subscribe())
    }

    pub fn logger(&self) -> &dyn EventLogger {
        self.logger.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    pub async fn pause(&mut self, duration: Duration) -> Wait {
        cancellable_sleep(&mut self.cancel, duration).await
    }

    /// Recompute aggregates and publish a snapshot.
    pub fn publish(&mut self) {
        self.run.recompute_fills();
        self.publisher.send_replace(self.run.clone());
    }

    fn split(&mut self) -> (LegOps<'_>, &mut StrategyRun) {
        let ops = LegOps {
            exchange: self.exchange.as_ref(),
            logger: self.logger.as_ref(),
            owner: self.run.run_id,
        };
        (ops, &mut self.run)
    }

    /// Append a leg for `request` and submit it. Returns the leg's index in
    /// `run.legs` together with the placement result.
    pub async fn submit(&mut self, request: OrderRequest, level: Option<usize>) -> (usize, Result<(), ExchangeError>) {
        let leg_id = self.run.legs.len() as LegId + 1;
        let mut leg = OrderLeg::new(leg_id, self.run.run_id, request);
        leg.level = level;

        let (ops, _) = self.split();
        let result = ops.submit(&mut leg).await;

        self.run.legs.push(leg);
        self.publish();
        (self.run.legs.len() - 1, result)
    }

    /// Poll one leg's status and publish any change.
    pub async fn refresh(&mut self, index: usize) -> LegState {
        let (ops, run) = self.split();
        let before = run.legs[index].clone();
        let state = ops.refresh(&mut run.legs[index]).await;
        if self.run.legs[index] != before {
            self.publish();
        }
        state
    }

    pub async fn cancel(&mut self, index: usize) -> CancelOutcome {
        let (ops, run) = self.split();
        let outcome = ops.cancel(&mut run.legs[index]).await;
        self.publish();
        outcome
    }

    /// Poll a leg until it is terminal, the fill timeout elapses, or a stop
    /// is requested.
    pub async fn await_fill(&mut self, index: usize) -> LegState {
        let deadline = tokio::time::Instant::now() + self.config.fill_timeout();
        loop {
            let state = self.refresh(index).await;
            if state.is_terminal() {
                return state;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                let leg_id = self.run.legs[index].leg_id;
                self.logger.record(EngineEvent::FillTimeout {
                    owner: self.run.run_id,
                    leg_id,
                    state,
                });
                return state;
            }
            let wait = self.config.poll_interval().min(deadline - now);
            if self.pause(wait).await == Wait::Cancelled {
                return state;
            }
        }
    }

    /// Move the run to a terminal status and publish the final snapshot.
    pub fn finish(&mut self, status: RunStatus, error: Option<String>) {
        if self.run.status.is_terminal() {
            return;
        }
        self.run.status = status;
        self.run.error = error;
        self.run.ended_at = Some(now_ms());
        self.publish();
        self.logger.record(EngineEvent::RunFinished {
            run_id: self.run.run_id,
            status,
            filled_quantity: self.run.filled_quantity,
            avg_fill_price: self.run.avg_fill_price,
            error: self.run.error.clone(),
        });
    }
}

impl Drop for RunContext {
    /// A run never disappears while RUNNING, even if its task panics.
    fn drop(&mut self) {
        if !self.run.status.is_terminal() {
            self.finish(RunStatus::Failed, Some("executor stopped unexpectedly".to_string()));
        }
    }
}

// =============================================================================
// Trading Engine: one instrument, one position, one cycle per candle
// =============================================================================
//
// Cycle:
//   fetch window -> evaluate indicators -> fuse -> walk bars through the
//   position state machine -> (after a close) re-optimize
//
// Per evaluated bar:
//   1. buy signal while Flat  -> staleness guard, journal check, size, fill,
//      stop = entry * stop_limit_percent, record
//   2. stop check             -> close <= stop forces an exit
//   3. sell signal or stop while Long -> staleness guard, journal check,
//      close all lots, reset stop, record, re-optimize
//
// Parameters found by a re-optimization in the middle of a cycle take effect
// from the next cycle; the rest of the current window is walked with the
// arrays it started with.
// =============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::execution::{FillResult, OrderAdapter};
use crate::indicators::evaluate;
use crate::journal::{TradeJournal, TradeRecord, TradeSink};
use crate::market_data::{Candle, CandleSource};
use crate::params::ParameterSet;
use crate::position_engine::Position;
use crate::reconcile::reconcile_live;
use crate::reoptimize::{OptimizationWindow, ReoptimizationTrigger};
use crate::signals::{Signal, SignalFuser};
use crate::types::{CandleDuration, ExecutionMode, Side};

/// Backtest entries are always one unit at the bar close.
const BACKTEST_UNITS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub instrument: String,
    pub duration: CandleDuration,
    /// Number of candles fetched per cycle.
    pub past_period: usize,
    pub use_percent: f64,
    pub stop_limit_percent: f64,
    pub mode: ExecutionMode,
}

/// Collaborators the engine drives.
pub struct EngineParts {
    pub source: Arc<dyn CandleSource>,
    pub adapter: Arc<dyn OrderAdapter>,
    pub sink: Arc<dyn TradeSink>,
    pub fuser: Box<dyn SignalFuser>,
    pub trigger: ReoptimizationTrigger,
}

pub struct TradingEngine {
    settings: EngineSettings,
    source: Arc<dyn CandleSource>,
    adapter: Arc<dyn OrderAdapter>,
    sink: Arc<dyn TradeSink>,
    fuser: Box<dyn SignalFuser>,
    trigger: ReoptimizationTrigger,
    cancel: CancellationToken,

    position: Position,
    params: Option<ParameterSet>,
    journal: TradeJournal,
    trading_start: DateTime<Utc>,
}

impl TradingEngine {
    pub fn new(settings: EngineSettings, parts: EngineParts, cancel: CancellationToken) -> Self {
        // Backtests replay history, so every bar is tradable.
        let trading_start = if settings.mode.is_backtest() {
            DateTime::<Utc>::MIN_UTC
        } else {
            Utc::now()
        };

        Self {
            settings,
            source: parts.source,
            adapter: parts.adapter,
            sink: parts.sink,
            fuser: parts.fuser,
            trigger: parts.trigger,
            cancel,
            position: Position::flat(),
            params: None,
            journal: TradeJournal::new(),
            trading_start,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn params(&self) -> Option<&ParameterSet> {
        self.params.as_ref()
    }

    pub fn journal(&self) -> &TradeJournal {
        &self.journal
    }

    pub fn trading_start(&self) -> DateTime<Utc> {
        self.trading_start
    }

    fn window(&self) -> OptimizationWindow {
        OptimizationWindow {
            instrument: self.settings.instrument.clone(),
            duration: self.settings.duration,
            count: self.settings.past_period,
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Reconcile (live only) and obtain the first parameter set. Any error
    /// here is fatal to the caller.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        info!(
            action = "start",
            instrument = %self.settings.instrument,
            duration = %self.settings.duration,
            mode = %self.settings.mode,
            fuser = self.fuser.name(),
            adapter = self.adapter.name(),
            max_attempts = ?self.trigger.policy().max_attempts,
            backoff_multiplier = self.trigger.policy().backoff_multiplier,
            "engine starting"
        );

        if !self.settings.mode.is_backtest() {
            let state = reconcile_live(
                self.adapter.as_ref(),
                self.sink.as_ref(),
                &self.settings.instrument,
                self.settings.stop_limit_percent,
            )
            .await?;
            self.position = state.position;
            self.journal.seed(state.journal_seed);
        }

        let window = self.window();
        let params = self
            .trigger
            .run(self.source.as_ref(), &window, &self.cancel)
            .await?;
        self.params = Some(params);
        Ok(())
    }

    /// Start, then run one cycle per candle duration until cancelled.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.start().await?;

        let mut ticker = tokio::time::interval(self.settings.duration.as_std());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        info!(
            action = "shutdown",
            position = %self.position.side,
            trades = self.journal.records().len(),
            "engine stopped"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    /// One full pass over the current window. Errors are logged, never raised.
    pub async fn run_cycle(&mut self) {
        let Some(params) = self.params.clone() else {
            self.reoptimize().await;
            return;
        };

        let series = match self
            .source
            .get_candles(
                &self.settings.instrument,
                self.settings.duration,
                self.settings.past_period,
            )
            .await
        {
            Ok(series) if !series.is_empty() => series,
            Ok(_) => {
                let err = EngineError::DataUnavailable { reason: "empty candle window".into() };
                warn!(action = "cycle", error = %err, "skipping cycle");
                return;
            }
            Err(e) => {
                let err = EngineError::DataUnavailable { reason: format!("{e:#}") };
                warn!(action = "cycle", error = %err, "skipping cycle");
                return;
            }
        };

        let output = evaluate(&series, &params);
        let signals = self.fuser.fuse(&series, &output, &params);
        let trades_before = self.journal.records().len();

        for bar in &signals {
            let Some(candle) = series.candles().get(bar.index) else {
                continue;
            };
            self.step(candle, bar.signal).await;
        }

        debug_assert!(self.position.is_consistent());
        info!(
            action = "cycle",
            bars = series.len(),
            evaluated = signals.len(),
            trades = self.journal.records().len() - trades_before,
            position = %self.position.side,
            stop = self.position.stop_price,
            "cycle complete"
        );
    }

    /// Apply one fused signal at one bar.
    pub async fn step(&mut self, candle: &Candle, signal: Signal) {
        self.adapter.observe(candle);
        debug!(
            action = "evaluate",
            time = %candle.time,
            close = candle.close,
            direction = ?signal.direction(),
            corroboration = signal.corroboration,
            "bar evaluated"
        );

        if signal.wants_buy() {
            if self.position.is_flat() {
                match self.buy(candle).await {
                    Ok(Some(_)) => {}
                    Ok(None) => return,
                    Err(e) => {
                        log_rejection(&e, candle);
                        return;
                    }
                }
            } else {
                debug!(action = "buy", time = %candle.time, "already long, ignoring buy");
            }
        }

        let stop_hit = self.position.stop_triggered(candle.close);
        if !(signal.wants_sell() || stop_hit) {
            return;
        }
        if !self.position.is_long() {
            debug!(action = "sell", time = %candle.time, "flat, ignoring sell");
            return;
        }

        match self.sell(candle, stop_hit).await {
            Ok(Some(_)) => self.reoptimize().await,
            Ok(None) => {}
            Err(e) => log_rejection(&e, candle),
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    fn guard_stale(&self, action: &'static str, time: DateTime<Utc>) -> Result<(), EngineError> {
        if time < self.trading_start {
            return Err(EngineError::StaleSignal {
                action,
                candle_time: time,
                trading_start: self.trading_start,
            });
        }
        Ok(())
    }

    /// Flat -> Long. `Ok(None)` when the journal already has this bar.
    async fn buy(&mut self, candle: &Candle) -> Result<Option<TradeRecord>, EngineError> {
        self.guard_stale("buy", candle.time)?;
        if !self.journal.can_buy(candle.time) {
            debug!(action = "buy", time = %candle.time, "journal rejects buy");
            return Ok(None);
        }

        let notional = if self.settings.mode.is_backtest() {
            candle.close * BACKTEST_UNITS
        } else {
            let balance = self
                .adapter
                .get_available_balance()
                .await
                .map_err(|e| EngineError::rejected("buy", format!("balance lookup failed: {e:#}")))?;
            balance * self.settings.use_percent
        };

        let fill = self
            .adapter
            .submit_buy(&self.settings.instrument, notional)
            .await
            .map_err(|e| EngineError::rejected("buy", format!("{e:#}")))?;

        self.position.open(fill, self.settings.stop_limit_percent);
        Ok(Some(self.record(candle.time, fill, Side::Buy)))
    }

    /// Long -> Flat. `Ok(None)` when the journal already has this bar.
    async fn sell(
        &mut self,
        candle: &Candle,
        stop_hit: bool,
    ) -> Result<Option<TradeRecord>, EngineError> {
        self.guard_stale("sell", candle.time)?;
        if !self.journal.can_sell(candle.time) {
            debug!(action = "sell", time = %candle.time, "journal rejects sell");
            return Ok(None);
        }

        let snapshot = self
            .adapter
            .get_open_position()
            .await
            .map_err(|e| EngineError::rejected("sell", format!("position lookup failed: {e:#}")))?;
        if snapshot.total_size() <= 0.0 {
            return Err(EngineError::rejected("sell", "open position has zero units"));
        }

        let fill = self
            .adapter
            .close_position()
            .await
            .map_err(|e| EngineError::rejected("sell", format!("{e:#}")))?;

        if stop_hit {
            info!(
                action = "stop_exit",
                close = candle.close,
                stop = self.position.stop_price,
                "stop reached"
            );
        }
        self.position.close();
        Ok(Some(self.record(candle.time, fill, Side::Sell)))
    }

    fn record(&mut self, time: DateTime<Utc>, fill: FillResult, side: Side) -> TradeRecord {
        let live = !self.settings.mode.is_backtest();
        let mut record = TradeRecord::new(
            self.settings.instrument.clone(),
            time,
            fill.price,
            fill.size,
            side,
            live,
        );

        if live {
            if let Err(e) = self.sink.append(&record) {
                warn!(action = "persist_trade", id = %record.id, error = %e, "trade record not persisted");
                record.persisted = false;
            }
        }

        info!(
            action = "trade",
            side = %side,
            time = %time,
            price = fill.price,
            size = fill.size,
            persisted = record.persisted,
            "trade recorded"
        );
        self.journal.push(record.clone());
        record
    }

    /// Mid-run re-optimization. Exhaustion clears the parameters so the next
    /// cycle tries again.
    async fn reoptimize(&mut self) {
        let window = self.window();
        let result = self
            .trigger
            .run(self.source.as_ref(), &window, &self.cancel)
            .await;
        match result {
            Ok(params) => self.params = Some(params),
            Err(EngineError::Cancelled) => {
                info!(action = "reoptimize", "shutdown during re-optimization");
            }
            Err(e) => {
                warn!(action = "reoptimize", error = %e, "no parameters, trading paused until next cycle");
                self.params = None;
            }
        }
    }
}

fn log_rejection(err: &EngineError, candle: &Candle) {
    match err {
        // Rescanned history in live mode lands here every cycle.
        EngineError::StaleSignal { action, .. } => {
            debug!(action = *action, time = %candle.time, "stale signal ignored")
        }
        _ => warn!(time = %candle.time, error = %err, "order not executed"),
    }
}

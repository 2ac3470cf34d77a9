// =============================================================================
// Order Execution: live exchange adapter and backtest simulator
// =============================================================================
//
// The engine talks to one `OrderAdapter`. In live mode that is the exchange
// adapter, which sizes market orders from the ticker and reports the VWAP of
// the resulting executions. In backtest mode it is the simulator, which fills
// at the last observed close.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::exchange::{ExchangeClient, Execution};
use crate::market_data::Candle;
use crate::types::Side;

/// Executions can lag the order acknowledgement by a moment.
const EXECUTION_POLL_ATTEMPTS: u32 = 5;
const EXECUTION_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillResult {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lot {
    pub price: f64,
    pub size: f64,
}

/// All open lots of the instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionSnapshot {
    pub lots: Vec<Lot>,
}

impl PositionSnapshot {
    pub fn total_size(&self) -> f64 {
        self.lots.iter().map(|l| l.size.abs()).sum()
    }

    /// Size-weighted average price; `None` when nothing is open.
    pub fn vwap(&self) -> Option<f64> {
        let total = self.total_size();
        if total <= 0.0 {
            return None;
        }
        let notional: f64 = self.lots.iter().map(|l| l.price * l.size.abs()).sum();
        Some(notional / total)
    }
}

fn vwap_of(executions: &[Execution]) -> Option<FillResult> {
    let size: f64 = executions.iter().map(|e| e.size).sum();
    if size <= 0.0 {
        return None;
    }
    let notional: f64 = executions.iter().map(|e| e.price * e.size).sum();
    Some(FillResult {
        price: notional / size,
        size,
    })
}

/// Largest multiple of `step` not above `size`.
pub fn floor_to_step(size: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return size;
    }
    // The epsilon keeps 0.3 / 0.1 from flooring to 2.
    let steps = (size / step + 1e-9).floor();
    steps * step
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait OrderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called with each bar before the engine acts on it.
    fn observe(&self, _candle: &Candle) {}

    async fn submit_buy(&self, instrument: &str, notional: f64) -> Result<FillResult>;

    async fn get_open_position(&self) -> Result<PositionSnapshot>;

    /// Close every open lot; returns the VWAP and total size closed.
    async fn close_position(&self) -> Result<FillResult>;

    async fn get_available_balance(&self) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// Live adapter
// ---------------------------------------------------------------------------

pub struct ExchangeOrderAdapter {
    client: Arc<ExchangeClient>,
    symbol: String,
    size_step: f64,
}

impl ExchangeOrderAdapter {
    pub fn new(client: Arc<ExchangeClient>, symbol: impl Into<String>, size_step: f64) -> Self {
        Self {
            client,
            symbol: symbol.into(),
            size_step,
        }
    }

    async fn await_fill(&self, order_id: &str) -> Result<FillResult> {
        for attempt in 1..=EXECUTION_POLL_ATTEMPTS {
            let executions = self.client.get_executions(order_id).await?;
            if let Some(fill) = vwap_of(&executions) {
                return Ok(fill);
            }
            debug!(order_id, attempt, "no executions yet");
            tokio::time::sleep(EXECUTION_POLL_INTERVAL).await;
        }
        bail!("order {order_id} reported no executions")
    }
}

#[async_trait]
impl OrderAdapter for ExchangeOrderAdapter {
    fn name(&self) -> &'static str {
        "exchange"
    }

    async fn submit_buy(&self, instrument: &str, notional: f64) -> Result<FillResult> {
        let ticker = self.client.get_ticker(instrument).await?;
        if ticker <= 0.0 {
            bail!("ticker for {instrument} is not positive: {ticker}");
        }
        let size = floor_to_step(notional / ticker, self.size_step);
        if size <= 0.0 {
            bail!("notional {notional:.2} buys less than one size step at {ticker}");
        }

        let order_id = self
            .client
            .place_market_order(instrument, Side::Buy, size)
            .await
            .context("buy order failed")?;
        let fill = self.await_fill(&order_id).await?;

        info!(
            action = "submit_buy",
            instrument,
            order_id = %order_id,
            price = fill.price,
            size = fill.size,
            "buy filled"
        );
        Ok(fill)
    }

    async fn get_open_position(&self) -> Result<PositionSnapshot> {
        let lots = self.client.get_open_positions(&self.symbol).await?;
        Ok(PositionSnapshot {
            lots: lots
                .into_iter()
                .filter(|l| l.side == Side::Buy)
                .map(|l| Lot {
                    price: l.price,
                    size: l.size,
                })
                .collect(),
        })
    }

    async fn close_position(&self) -> Result<FillResult> {
        let snapshot = self.get_open_position().await?;
        let total = snapshot.total_size();
        if total <= 0.0 {
            bail!("no open lots for {}", self.symbol);
        }

        let order_id = self
            .client
            .close_bulk(&self.symbol, Side::Sell, total)
            .await
            .context("close order failed")?;

        // Report the close at the executions' VWAP when they are visible,
        // otherwise at the entry VWAP of the lots that were closed.
        let fill = match self.await_fill(&order_id).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "close executions unavailable, using lot VWAP");
                FillResult {
                    price: snapshot.vwap().unwrap_or_default(),
                    size: total,
                }
            }
        };

        info!(
            action = "close_position",
            symbol = %self.symbol,
            order_id = %order_id,
            price = fill.price,
            size = fill.size,
            "position closed"
        );
        Ok(fill)
    }

    async fn get_available_balance(&self) -> Result<f64> {
        self.client.get_available_amount().await
    }
}

impl std::fmt::Debug for ExchangeOrderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeOrderAdapter")
            .field("client", &"<ExchangeClient>")
            .field("symbol", &self.symbol)
            .field("size_step", &self.size_step)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SimState {
    mark: Option<f64>,
    lots: Vec<Lot>,
    cash: f64,
}

/// Deterministic fills at the last observed close.
#[derive(Debug, Default)]
pub struct ExecutionSimulator {
    state: Mutex<SimState>,
}

impl ExecutionSimulator {
    pub fn new(starting_cash: f64) -> Self {
        Self {
            state: Mutex::new(SimState {
                cash: starting_cash,
                ..SimState::default()
            }),
        }
    }

    fn mark(&self) -> Result<f64> {
        self.state
            .lock()
            .mark
            .context("simulator has not observed a price yet")
    }
}

#[async_trait]
impl OrderAdapter for ExecutionSimulator {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn observe(&self, candle: &Candle) {
        self.state.lock().mark = Some(candle.close);
    }

    async fn submit_buy(&self, instrument: &str, notional: f64) -> Result<FillResult> {
        let price = self.mark()?;
        let size = notional / price;
        let mut state = self.state.lock();
        state.lots.push(Lot { price, size });
        state.cash -= notional;
        debug!(action = "submit_buy", instrument, price, size, "simulated fill");
        Ok(FillResult { price, size })
    }

    async fn get_open_position(&self) -> Result<PositionSnapshot> {
        Ok(PositionSnapshot {
            lots: self.state.lock().lots.clone(),
        })
    }

    async fn close_position(&self) -> Result<FillResult> {
        let price = self.mark()?;
        let mut state = self.state.lock();
        let size: f64 = state.lots.drain(..).map(|l| l.size).sum();
        if size <= 0.0 {
            bail!("no open lots to close");
        }
        state.cash += price * size;
        debug!(action = "close_position", price, size, "simulated close");
        Ok(FillResult { price, size })
    }

    async fn get_available_balance(&self) -> Result<f64> {
        Ok(self.state.lock().cash)
    }
}

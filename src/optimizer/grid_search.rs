// =============================================================================
// Grid-search optimizer
// =============================================================================
//
// Each family is tuned on its own: every combination in its grid is
// backtested with only that family voting, one unit per trade, and scored by
// realised profit. A family is enabled when its best combination made money.
// Positions still open at the end of the window do not count.
// =============================================================================

use tracing::{debug, info};

use super::Optimizer;
use crate::indicators::evaluate;
use crate::market_data::CandleSeries;
use crate::params::{MovingAverageKind, ParameterSet};
use crate::signals::rules::family_votes;
use crate::signals::Signal;

const MA_FAST: [usize; 5] = [3, 5, 7, 9, 12];
const MA_SLOW: [usize; 5] = [8, 14, 20, 26, 50];
const BB_PERIOD: [usize; 3] = [10, 20, 30];
const BB_STD: [f64; 3] = [1.5, 2.0, 2.5];
const RSI_PERIOD: [usize; 3] = [7, 14, 21];
const RSI_BUY: [f64; 3] = [20.0, 25.0, 30.0];
const RSI_SELL: [f64; 3] = [70.0, 75.0, 80.0];
const MACD_FAST: [usize; 2] = [8, 12];
const MACD_SLOW: [usize; 2] = [21, 26];
const MACD_SIGNAL: [usize; 2] = [5, 9];

#[derive(Debug, Clone, Default)]
pub struct GridSearchOptimizer;

impl GridSearchOptimizer {
    pub fn new() -> Self {
        Self
    }
}

/// Realised profit of trading `params` over `series`, one unit per entry.
pub fn backtest_profit(series: &CandleSeries, params: &ParameterSet) -> f64 {
    let output = evaluate(series, params);
    let closes = series.closes();
    let mut entry: Option<f64> = None;
    let mut profit = 0.0;

    for i in 1..series.len() {
        let signal = Signal::from_votes(&family_votes(series, &output, params, i));
        match entry {
            None if signal.wants_buy() => entry = Some(closes[i]),
            Some(price) if signal.wants_sell() => {
                profit += closes[i] - price;
                entry = None;
            }
            _ => {}
        }
    }
    profit
}

/// Best `(params, profit)` among `candidates`; earlier candidates win ties.
fn best_of(
    series: &CandleSeries,
    candidates: impl IntoIterator<Item = ParameterSet>,
) -> Option<(ParameterSet, f64)> {
    let mut best: Option<(ParameterSet, f64)> = None;
    for candidate in candidates {
        let profit = backtest_profit(series, &candidate);
        if best.as_ref().map_or(true, |(_, p)| profit > *p) {
            best = Some((candidate, profit));
        }
    }
    best
}

fn moving_average_grid() -> Vec<ParameterSet> {
    let mut grid = Vec::new();
    for &fast in &MA_FAST {
        for &slow in MA_SLOW.iter().filter(|&&s| s > fast) {
            let mut p = ParameterSet::disabled();
            p.moving_average.enabled = true;
            p.moving_average.kind = MovingAverageKind::Exponential;
            p.moving_average.fast_period = fast;
            p.moving_average.slow_period = slow;
            grid.push(p);
        }
    }
    grid
}

fn bollinger_grid() -> Vec<ParameterSet> {
    let mut grid = Vec::new();
    for &period in &BB_PERIOD {
        for &num_std in &BB_STD {
            let mut p = ParameterSet::disabled();
            p.bollinger.enabled = true;
            p.bollinger.period = period;
            p.bollinger.num_std = num_std;
            grid.push(p);
        }
    }
    grid
}

fn ichimoku_grid() -> Vec<ParameterSet> {
    let mut p = ParameterSet::disabled();
    p.ichimoku.enabled = true;
    vec![p]
}

fn rsi_grid() -> Vec<ParameterSet> {
    let mut grid = Vec::new();
    for &period in &RSI_PERIOD {
        for &buy_threshold in &RSI_BUY {
            for &sell_threshold in &RSI_SELL {
                let mut p = ParameterSet::disabled();
                p.rsi.enabled = true;
                p.rsi.period = period;
                p.rsi.buy_threshold = buy_threshold;
                p.rsi.sell_threshold = sell_threshold;
                grid.push(p);
            }
        }
    }
    grid
}

fn macd_grid() -> Vec<ParameterSet> {
    let mut grid = Vec::new();
    for &fast in &MACD_FAST {
        for &slow in &MACD_SLOW {
            for &signal_period in &MACD_SIGNAL {
                let mut p = ParameterSet::disabled();
                p.macd.enabled = true;
                p.macd.fast_period = fast;
                p.macd.slow_period = slow;
                p.macd.signal_period = signal_period;
                grid.push(p);
            }
        }
    }
    grid
}

impl Optimizer for GridSearchOptimizer {
    fn optimize(&self, series: &CandleSeries) -> Option<ParameterSet> {
        if series.len() < 2 {
            debug!(action = "optimize", bars = series.len(), "series too short");
            return None;
        }

        let mut result = ParameterSet::disabled();

        if let Some((best, profit)) = best_of(series, moving_average_grid()) {
            debug!(family = "moving_average", profit, "best combination");
            if profit > 0.0 {
                result.moving_average = best.moving_average;
            }
        }
        if let Some((best, profit)) = best_of(series, bollinger_grid()) {
            debug!(family = "bollinger", profit, "best combination");
            if profit > 0.0 {
                result.bollinger = best.bollinger;
            }
        }
        if let Some((best, profit)) = best_of(series, ichimoku_grid()) {
            debug!(family = "ichimoku", profit, "best combination");
            if profit > 0.0 {
                result.ichimoku = best.ichimoku;
            }
        }
        if let Some((best, profit)) = best_of(series, rsi_grid()) {
            debug!(family = "rsi", profit, "best combination");
            if profit > 0.0 {
                result.rsi = best.rsi;
            }
        }
        if let Some((best, profit)) = best_of(series, macd_grid()) {
            debug!(family = "macd", profit, "best combination");
            if profit > 0.0 {
                result.macd = best.macd;
            }
        }

        info!(
            action = "optimize",
            instrument = series.instrument(),
            duration = %series.duration(),
            bars = series.len(),
            enabled = result.enabled_count(),
            ma = result.moving_average.enabled,
            bb = result.bollinger.enabled,
            ichimoku = result.ichimoku.enabled,
            rsi = result.rsi.enabled,
            macd = result.macd.enabled,
            "optimization finished"
        );

        result.any_enabled().then_some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ema_params, series_from_closes};

    /// Triangle wave between 80 and 120 with 20-bar legs.
    fn triangle_wave(cycles: usize) -> Vec<f64> {
        let mut closes = Vec::new();
        for _ in 0..cycles {
            closes.extend((0..20).map(|i| 120.0 - 2.0 * i as f64));
            closes.extend((0..20).map(|i| 80.0 + 2.0 * i as f64));
        }
        closes
    }

    #[test]
    fn ema_pair_profits_on_swings() {
        let series = series_from_closes(&triangle_wave(4));
        assert!(backtest_profit(&series, &ema_params(3, 8)) > 0.0);
    }

    #[test]
    fn swinging_market_enables_moving_average() {
        let series = series_from_closes(&triangle_wave(4));
        let params = GridSearchOptimizer::new().optimize(&series).unwrap();
        assert!(params.moving_average.enabled);
        assert!(params.moving_average.fast_period < params.moving_average.slow_period);
    }

    #[test]
    fn flat_market_yields_none() {
        let series = series_from_closes(&[100.0; 120]);
        assert!(GridSearchOptimizer::new().optimize(&series).is_none());
    }

    #[test]
    fn short_series_yields_none() {
        let series = series_from_closes(&[100.0]);
        assert!(GridSearchOptimizer::new().optimize(&series).is_none());
    }

    #[test]
    fn open_position_at_end_is_not_counted() {
        // Single upward cross at bar 20, never closed.
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..10).map(|i| 95.0 + i as f64));
        let series = series_from_closes(&closes);
        assert_eq!(backtest_profit(&series, &ema_params(3, 8)), 0.0);
    }
}

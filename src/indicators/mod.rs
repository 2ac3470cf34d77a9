// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator computations. Every array is aligned
// index-for-index with the input series; entries inside an indicator's
// warm-up window are NaN and must never be read as a value.

pub mod bollinger;
pub mod ema;
pub mod ichimoku;
pub mod macd;
pub mod rsi;

use tracing::debug;

use crate::market_data::CandleSeries;
use crate::params::{MovingAverageKind, ParameterSet};

pub use bollinger::{calculate_bollinger, BollingerBands};
pub use ema::{calculate_ema, calculate_sma};
pub use ichimoku::{calculate_ichimoku, IchimokuCloud};
pub use macd::{calculate_macd, MacdLines};
pub use rsi::calculate_rsi;

/// Fast/slow moving-average pair.
#[derive(Debug, Clone)]
pub struct MovingAveragePair {
    pub fast: Vec<f64>,
    pub slow: Vec<f64>,
}

/// Arrays for every enabled family; disabled families are `None`.
#[derive(Debug, Clone, Default)]
pub struct IndicatorOutput {
    pub moving_average: Option<MovingAveragePair>,
    pub bollinger: Option<BollingerBands>,
    pub ichimoku: Option<IchimokuCloud>,
    pub rsi: Option<Vec<f64>>,
    pub macd: Option<MacdLines>,
}

impl IndicatorOutput {
    pub fn is_empty(&self) -> bool {
        self.family_count() == 0
    }

    pub fn family_count(&self) -> usize {
        [
            self.moving_average.is_some(),
            self.bollinger.is_some(),
            self.ichimoku.is_some(),
            self.rsi.is_some(),
            self.macd.is_some(),
        ]
        .iter()
        .filter(|&&present| present)
        .count()
    }
}

/// Compute the arrays of every family enabled in `params` over `series`.
pub fn evaluate(series: &CandleSeries, params: &ParameterSet) -> IndicatorOutput {
    let closes = series.closes();
    let mut output = IndicatorOutput::default();

    let ma = &params.moving_average;
    if ma.enabled {
        let average: fn(&[f64], usize) -> Vec<f64> = match ma.kind {
            MovingAverageKind::Simple => calculate_sma,
            MovingAverageKind::Exponential => calculate_ema,
        };
        output.moving_average = Some(MovingAveragePair {
            fast: average(closes, ma.fast_period),
            slow: average(closes, ma.slow_period),
        });
    }

    if params.bollinger.enabled {
        output.bollinger = Some(calculate_bollinger(
            closes,
            params.bollinger.period,
            params.bollinger.num_std,
        ));
    }

    if params.ichimoku.enabled {
        output.ichimoku = Some(calculate_ichimoku(closes));
    }

    if params.rsi.enabled {
        output.rsi = Some(calculate_rsi(closes, params.rsi.period));
    }

    if params.macd.enabled {
        output.macd = Some(calculate_macd(
            closes,
            params.macd.fast_period,
            params.macd.slow_period,
            params.macd.signal_period,
        ));
    }

    debug!(
        action = "evaluate",
        bars = series.len(),
        families = output.family_count(),
        "indicators evaluated"
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::series_from_closes;

    #[test]
    fn all_disabled_yields_no_arrays() {
        let series = series_from_closes(&(0..40).map(|i| i as f64).collect::<Vec<_>>());
        let output = evaluate(&series, &ParameterSet::disabled());
        assert!(output.is_empty());
    }

    #[test]
    fn enabled_families_are_aligned_with_series() {
        let series = series_from_closes(&(0..90).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let mut params = ParameterSet::disabled();
        params.moving_average.enabled = true;
        params.bollinger.enabled = true;
        params.ichimoku.enabled = true;
        params.rsi.enabled = true;
        params.macd.enabled = true;

        let output = evaluate(&series, &params);
        assert_eq!(output.family_count(), 5);
        let ma = output.moving_average.as_ref().unwrap();
        assert_eq!(ma.fast.len(), 90);
        assert_eq!(output.bollinger.as_ref().unwrap().lower.len(), 90);
        assert_eq!(output.ichimoku.as_ref().unwrap().span_b.len(), 90);
        assert_eq!(output.rsi.as_ref().unwrap().len(), 90);
        assert_eq!(output.macd.as_ref().unwrap().signal.len(), 90);
    }

    #[test]
    fn simple_kind_uses_sma() {
        let series = series_from_closes(&[1.0, 2.0, 3.0, 4.0]);
        let mut params = ParameterSet::disabled();
        params.moving_average = crate::params::MovingAverageParams {
            enabled: true,
            kind: MovingAverageKind::Simple,
            fast_period: 2,
            slow_period: 3,
        };
        let ma = evaluate(&series, &params).moving_average.unwrap();
        assert!((ma.fast[1] - 1.5).abs() < 1e-12);
        assert!((ma.slow[3] - 3.0).abs() < 1e-12);
    }
}

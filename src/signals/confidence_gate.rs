// =============================================================================
// Confidence Gate Fuser
// =============================================================================
//
// Looks at the two most recent bars only. The decision carries through only
// when at least `min_corroboration` families fired in either direction;
// otherwise the bar is reported with its corroboration but no votes.
// =============================================================================

use tracing::debug;

use super::rules::family_votes;
use super::{BarSignal, Signal, SignalFuser};
use crate::indicators::IndicatorOutput;
use crate::market_data::CandleSeries;
use crate::params::ParameterSet;

pub const DEFAULT_MIN_CORROBORATION: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    min_corroboration: u32,
}

impl ConfidenceGate {
    pub fn new(min_corroboration: u32) -> Self {
        Self { min_corroboration }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CORROBORATION)
    }
}

impl SignalFuser for ConfidenceGate {
    fn name(&self) -> &'static str {
        "confidence_gate"
    }

    fn fuse(
        &self,
        series: &CandleSeries,
        output: &IndicatorOutput,
        params: &ParameterSet,
    ) -> Vec<BarSignal> {
        if series.len() < 2 {
            return Vec::new();
        }
        let index = series.len() - 1;
        let votes = family_votes(series, output, params, index);
        let tally = Signal::from_votes(&votes);

        let passed = tally.corroboration >= self.min_corroboration;
        let signal = if passed {
            tally
        } else {
            Signal {
                corroboration: tally.corroboration,
                ..Signal::none()
            }
        };

        let fired: Vec<&str> = votes
            .iter()
            .filter(|(_, v)| v.fired())
            .map(|(f, _)| f.name())
            .collect();
        debug!(
            action = "fuse",
            policy = "confidence_gate",
            index,
            corroboration = tally.corroboration,
            required = self.min_corroboration,
            passed,
            fired = ?fired,
            "corroboration checked"
        );
        vec![BarSignal { index, signal }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::evaluate;
    use crate::test_support::{ema_params, series_from_closes};

    /// Closes whose last bar is the EMA(3)/EMA(8) upward cross.
    fn crossing_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.push(95.0);
        closes
    }

    #[test]
    fn single_family_below_threshold_takes_no_action() {
        let series = series_from_closes(&crossing_closes());
        let mut params = ema_params(3, 8);
        // Second family enabled but quiet on this bar.
        params.macd.enabled = true;
        let output = evaluate(&series, &params);

        let signals = ConfidenceGate::new(2).fuse(&series, &output, &params);
        assert_eq!(signals.len(), 1);
        let bar = signals[0];
        assert_eq!(bar.index, 20);
        assert_eq!(bar.signal.corroboration, 1);
        assert!(!bar.signal.wants_buy());
        assert!(!bar.signal.wants_sell());
    }

    #[test]
    fn single_family_passes_threshold_of_one() {
        let series = series_from_closes(&crossing_closes());
        let params = ema_params(3, 8);
        let output = evaluate(&series, &params);

        let signals = ConfidenceGate::new(1).fuse(&series, &output, &params);
        assert_eq!(signals[0].signal, Signal { buy_votes: 1, sell_votes: 0, corroboration: 1 });
    }

    #[test]
    fn only_latest_bar_is_evaluated() {
        let mut closes = crossing_closes();
        closes.push(96.0);
        let series = series_from_closes(&closes);
        let params = ema_params(3, 8);
        let output = evaluate(&series, &params);

        // The cross happened one bar ago, so the latest pair is quiet.
        let signals = ConfidenceGate::new(1).fuse(&series, &output, &params);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].index, 21);
        assert_eq!(signals[0].signal, Signal::none());
    }

    #[test]
    fn all_disabled_reports_nothing() {
        let series = series_from_closes(&crossing_closes());
        let params = ParameterSet::disabled();
        let output = evaluate(&series, &params);
        let signals = ConfidenceGate::default().fuse(&series, &output, &params);
        assert_eq!(signals[0].signal, Signal::none());
    }
}

// =============================================================================
// Vote Count Fuser
// =============================================================================
//
// Scans every bar of the window and sums per-family votes. Any positive buy
// count is actionable even when sells also fired. Replayed bars from the
// previous cycle are filtered further down by the trade journal.
// =============================================================================

use tracing::debug;

use super::rules::family_votes;
use super::{BarSignal, Signal, SignalFuser};
use crate::indicators::IndicatorOutput;
use crate::market_data::CandleSeries;
use crate::params::ParameterSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct VoteCount;

impl SignalFuser for VoteCount {
    fn name(&self) -> &'static str {
        "vote_count"
    }

    fn fuse(
        &self,
        series: &CandleSeries,
        output: &IndicatorOutput,
        params: &ParameterSet,
    ) -> Vec<BarSignal> {
        let signals: Vec<BarSignal> = (1..series.len())
            .map(|index| BarSignal {
                index,
                signal: Signal::from_votes(&family_votes(series, output, params, index)),
            })
            .collect();

        let active = signals
            .iter()
            .filter(|s| s.signal.wants_buy() || s.signal.wants_sell())
            .count();
        debug!(action = "fuse", policy = "vote_count", bars = signals.len(), active, "votes counted");
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::evaluate;
    use crate::test_support::{ema_params, series_from_closes};
    use proptest::prelude::*;

    fn scenario_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend((0..10).map(|i| 95.0 + i as f64));
        closes
    }

    #[test]
    fn ema_cross_votes_on_turning_bar() {
        let series = series_from_closes(&scenario_closes());
        let params = ema_params(3, 8);
        let output = evaluate(&series, &params);

        let signals = VoteCount.fuse(&series, &output, &params);
        assert_eq!(signals.len(), 29);
        let buys: Vec<usize> = signals
            .iter()
            .filter(|s| s.signal.wants_buy())
            .map(|s| s.index)
            .collect();
        assert_eq!(buys, vec![20]);
        assert!(signals.iter().all(|s| !s.signal.wants_sell()));
    }

    #[test]
    fn short_series_yields_zero_votes() {
        let series = series_from_closes(&[100.0, 101.0, 99.0, 102.0]);
        let mut params = ema_params(3, 8);
        params.rsi.enabled = true;
        params.macd.enabled = true;
        params.ichimoku.enabled = true;
        params.bollinger.enabled = true;
        let output = evaluate(&series, &params);

        for bar in VoteCount.fuse(&series, &output, &params) {
            assert_eq!(bar.signal, Signal::none());
        }
    }

    #[test]
    fn single_bar_has_nothing_to_compare() {
        let series = series_from_closes(&[100.0]);
        let params = ema_params(3, 8);
        let output = evaluate(&series, &params);
        assert!(VoteCount.fuse(&series, &output, &params).is_empty());
    }

    proptest! {
        #[test]
        fn all_disabled_never_signals(closes in prop::collection::vec(1.0f64..1000.0, 2..120)) {
            let series = series_from_closes(&closes);
            let params = ParameterSet::disabled();
            let output = evaluate(&series, &params);
            let signals = VoteCount.fuse(&series, &output, &params);
            prop_assert_eq!(signals.len(), closes.len() - 1);
            prop_assert!(signals.iter().all(|s| s.signal == Signal::none()));
        }
    }
}

// =============================================================================
// Per-family cross rules
// =============================================================================
//
// Each rule looks at bar `i - 1` and bar `i` and reports whether its family
// votes buy, sell, or neither. A rule never fires when any value it reads is
// NaN (warm-up) so short series cannot produce spurious crosses.
// =============================================================================

use crate::indicators::{BollingerBands, IchimokuCloud, IndicatorOutput, MacdLines, MovingAveragePair};
use crate::market_data::CandleSeries;
use crate::params::ParameterSet;

/// Indicator families that can vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    MovingAverage,
    Bollinger,
    Ichimoku,
    Rsi,
    Macd,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MovingAverage => "moving_average",
            Self::Bollinger => "bollinger",
            Self::Ichimoku => "ichimoku",
            Self::Rsi => "rsi",
            Self::Macd => "macd",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vote {
    pub buy: bool,
    pub sell: bool,
}

impl Vote {
    pub fn fired(&self) -> bool {
        self.buy || self.sell
    }
}

fn defined(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Fast line crossing the slow line.
pub fn moving_average_vote(pair: &MovingAveragePair, i: usize) -> Vote {
    let (f0, f1, s0, s1) = (pair.fast[i - 1], pair.fast[i], pair.slow[i - 1], pair.slow[i]);
    if !defined(&[f0, f1, s0, s1]) {
        return Vote::default();
    }
    Vote {
        buy: f0 < s0 && f1 >= s1,
        sell: f0 > s0 && f1 <= s1,
    }
}

/// Close coming back inside the bands: up through the lower band buys, down
/// through the upper band sells.
pub fn bollinger_vote(bands: &BollingerBands, closes: &[f64], i: usize) -> Vote {
    let (l0, l1, u0, u1) = (bands.lower[i - 1], bands.lower[i], bands.upper[i - 1], bands.upper[i]);
    let (c0, c1) = (closes[i - 1], closes[i]);
    if !defined(&[l0, l1, u0, u1, c0, c1]) {
        return Vote::default();
    }
    Vote {
        buy: l0 > c0 && l1 <= c1,
        sell: u0 < c0 && u1 >= c1,
    }
}

/// Lagging span crossing price with the cloud entirely on the other side and
/// conversion/base agreeing.
pub fn ichimoku_vote(cloud: &IchimokuCloud, highs: &[f64], lows: &[f64], i: usize) -> Vote {
    let (lag0, lag1) = (cloud.lagging[i - 1], cloud.lagging[i]);
    let (a, b) = (cloud.span_a[i], cloud.span_b[i]);
    let (conv, base) = (cloud.conversion[i], cloud.base[i]);
    let (h0, h1, lo0, lo1) = (highs[i - 1], highs[i], lows[i - 1], lows[i]);
    if !defined(&[lag0, lag1, a, b, conv, base, h0, h1, lo0, lo1]) {
        return Vote::default();
    }
    Vote {
        buy: lag0 < h0 && lag1 >= h1 && a < lo1 && b < lo1 && conv > base,
        sell: lag0 > lo0 && lag1 <= lo1 && a > h1 && b > h1 && conv < base,
    }
}

/// MACD crossing its signal line below zero (buy) or above zero (sell).
pub fn macd_vote(lines: &MacdLines, i: usize) -> Vote {
    let (m0, m1, s0, s1) = (lines.macd[i - 1], lines.macd[i], lines.signal[i - 1], lines.signal[i]);
    if !defined(&[m0, m1, s0, s1]) {
        return Vote::default();
    }
    Vote {
        buy: m1 < 0.0 && s1 < 0.0 && m0 < s0 && m1 >= s1,
        sell: m1 > 0.0 && s1 > 0.0 && m0 > s0 && m1 <= s1,
    }
}

/// RSI crossing up through the buy threshold or down through the sell
/// threshold. A previous value of exactly 0 or 100 is a degenerate reading
/// and never votes.
pub fn rsi_vote(rsi: &[f64], buy_threshold: f64, sell_threshold: f64, i: usize) -> Vote {
    let (r0, r1) = (rsi[i - 1], rsi[i]);
    if !defined(&[r0, r1]) || r0 == 0.0 || r0 == 100.0 {
        return Vote::default();
    }
    Vote {
        buy: r0 < buy_threshold && r1 >= buy_threshold,
        sell: r0 > sell_threshold && r1 <= sell_threshold,
    }
}

/// Votes of every enabled family at bar `i` (`i >= 1`).
pub fn family_votes(
    series: &CandleSeries,
    output: &IndicatorOutput,
    params: &ParameterSet,
    i: usize,
) -> Vec<(Family, Vote)> {
    let mut votes = Vec::with_capacity(5);
    if i == 0 || i >= series.len() {
        return votes;
    }

    if let Some(pair) = &output.moving_average {
        votes.push((Family::MovingAverage, moving_average_vote(pair, i)));
    }
    if let Some(bands) = &output.bollinger {
        votes.push((Family::Bollinger, bollinger_vote(bands, series.closes(), i)));
    }
    if let Some(cloud) = &output.ichimoku {
        votes.push((Family::Ichimoku, ichimoku_vote(cloud, series.highs(), series.lows(), i)));
    }
    if let Some(rsi) = &output.rsi {
        votes.push((
            Family::Rsi,
            rsi_vote(rsi, params.rsi.buy_threshold, params.rsi.sell_threshold, i),
        ));
    }
    if let Some(lines) = &output.macd {
        votes.push((Family::Macd, macd_vote(lines, i)));
    }
    votes
}

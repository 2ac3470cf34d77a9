// =============================================================================
// Signals Module
// =============================================================================
//
// Fusion of per-family indicator votes into one directional decision:
// - rules: per-family cross tests between bar i-1 and bar i
// - vote_count: every bar in the window, any buy vote is actionable
// - confidence_gate: latest bar only, gated on corroborating families

pub mod confidence_gate;
pub mod rules;
pub mod vote_count;

use serde::{Deserialize, Serialize};

use crate::indicators::IndicatorOutput;
use crate::market_data::CandleSeries;
use crate::params::ParameterSet;

pub use confidence_gate::ConfidenceGate;
pub use rules::{Family, Vote};
pub use vote_count::VoteCount;

/// Direction derived from a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

/// Fused decision for one bar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signal {
    pub buy_votes: u32,
    pub sell_votes: u32,
    /// Number of families that fired in either direction.
    pub corroboration: u32,
}

impl Signal {
    pub fn none() -> Self {
        Self::default()
    }

    /// Tally a bar's family votes.
    pub fn from_votes(votes: &[(Family, Vote)]) -> Self {
        let mut signal = Self::default();
        for (_, vote) in votes {
            if vote.buy {
                signal.buy_votes += 1;
            }
            if vote.sell {
                signal.sell_votes += 1;
            }
            if vote.fired() {
                signal.corroboration += 1;
            }
        }
        signal
    }

    pub fn wants_buy(&self) -> bool {
        self.buy_votes > 0
    }

    pub fn wants_sell(&self) -> bool {
        self.sell_votes > 0
    }

    /// Buy wins ties; whether it can act is up to the position.
    pub fn direction(&self) -> Direction {
        if self.wants_buy() {
            Direction::Buy
        } else if self.wants_sell() {
            Direction::Sell
        } else {
            Direction::Hold
        }
    }
}

/// A signal tagged with the series index it was evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSignal {
    pub index: usize,
    pub signal: Signal,
}

/// Turns aligned indicator arrays into per-bar signals.
///
/// Returned entries are in ascending `index` order and cover exactly the bars
/// the engine should walk through this cycle.
pub trait SignalFuser: Send + Sync {
    fn name(&self) -> &'static str;

    fn fuse(
        &self,
        series: &CandleSeries,
        output: &IndicatorOutput,
        params: &ParameterSet,
    ) -> Vec<BarSignal>;
}

/// Configuration selector for the fusion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPolicy {
    #[default]
    VoteCount,
    ConfidenceGate,
}

impl FusionPolicy {
    pub fn build(self, min_corroboration: u32) -> Box<dyn SignalFuser> {
        match self {
            Self::VoteCount => Box::new(VoteCount),
            Self::ConfidenceGate => Box::new(ConfidenceGate::new(min_corroboration)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_wins_tie() {
        let signal = Signal { buy_votes: 1, sell_votes: 1, corroboration: 2 };
        assert_eq!(signal.direction(), Direction::Buy);
        assert!(signal.wants_sell());
    }

    #[test]
    fn tally_counts_each_family_once() {
        let votes = [
            (Family::MovingAverage, Vote { buy: true, sell: false }),
            (Family::Rsi, Vote { buy: false, sell: true }),
            (Family::Macd, Vote::default()),
        ];
        let signal = Signal::from_votes(&votes);
        assert_eq!(signal, Signal { buy_votes: 1, sell_votes: 1, corroboration: 2 });
    }

    #[test]
    fn empty_signal_holds() {
        assert_eq!(Signal::none().direction(), Direction::Hold);
    }

    #[test]
    fn policy_names() {
        assert_eq!(FusionPolicy::VoteCount.build(2).name(), "vote_count");
        assert_eq!(FusionPolicy::ConfidenceGate.build(2).name(), "confidence_gate");
        let parsed: FusionPolicy = serde_json::from_str("\"confidence_gate\"").unwrap();
        assert_eq!(parsed, FusionPolicy::ConfidenceGate);
    }
}

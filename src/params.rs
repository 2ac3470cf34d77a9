// =============================================================================
// Indicator Parameter Set
// =============================================================================
//
// Enable flags and hyperparameters for every indicator family. A set is
// produced by an optimizer and replaced wholesale; it is never edited in
// place by the engine.
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovingAverageKind {
    Simple,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageParams {
    pub enabled: bool,
    #[serde(default)]
    pub kind: MovingAverageKind,
    pub fast_period: usize,
    pub slow_period: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerParams {
    pub enabled: bool,
    pub period: usize,
    pub num_std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IchimokuParams {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiParams {
    pub enabled: bool,
    pub period: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdParams {
    pub enabled: bool,
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

/// The full parameter set for one trading session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub moving_average: MovingAverageParams,
    pub bollinger: BollingerParams,
    pub ichimoku: IchimokuParams,
    pub rsi: RsiParams,
    pub macd: MacdParams,
}

impl ParameterSet {
    /// Conventional defaults with every family switched off.
    pub fn disabled() -> Self {
        Self {
            moving_average: MovingAverageParams {
                enabled: false,
                kind: MovingAverageKind::Exponential,
                fast_period: 7,
                slow_period: 14,
            },
            bollinger: BollingerParams {
                enabled: false,
                period: 20,
                num_std: 2.0,
            },
            ichimoku: IchimokuParams { enabled: false },
            rsi: RsiParams {
                enabled: false,
                period: 14,
                buy_threshold: 30.0,
                sell_threshold: 70.0,
            },
            macd: MacdParams {
                enabled: false,
                fast_period: 12,
                slow_period: 26,
                signal_period: 9,
            },
        }
    }

    pub fn enabled_count(&self) -> usize {
        [
            self.moving_average.enabled,
            self.bollinger.enabled,
            self.ichimoku.enabled,
            self.rsi.enabled,
            self.macd.enabled,
        ]
        .iter()
        .filter(|&&on| on)
        .count()
    }

    pub fn any_enabled(&self) -> bool {
        self.enabled_count() > 0
    }
}

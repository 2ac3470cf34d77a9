// =============================================================================
// Shared types used across the fusion trading engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of an order or a recorded trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the exchange ("BUY" / "SELL").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether orders hit the exchange or the local simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Backtest,
    Live,
}

impl ExecutionMode {
    pub fn from_back_test(back_test: bool) -> Self {
        if back_test {
            Self::Backtest
        } else {
            Self::Live
        }
    }

    pub fn is_backtest(&self) -> bool {
        matches!(self, Self::Backtest)
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backtest => write!(f, "Backtest"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Candle width. Only the three widths below are tradable; anything else
/// parses to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleDuration {
    OneMinute,
    FiveMinutes,
    OneHour,
}

impl CandleDuration {
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "1m" => Some(Self::OneMinute),
            "5m" => Some(Self::FiveMinutes),
            "1h" => Some(Self::OneHour),
            _ => None,
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Self::OneMinute => 60,
            Self::FiveMinutes => 300,
            Self::OneHour => 3600,
        }
    }

    pub fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds())
    }

    /// Interval name on the exchange's kline endpoint.
    pub fn exchange_interval(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinutes => "5min",
            Self::OneHour => "1hour",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::OneHour => "1h",
        }
    }
}

impl std::fmt::Display for CandleDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Length of a candle label in seconds; unrecognised labels are 0 (disabled).
pub fn duration_seconds(label: &str) -> u64 {
    CandleDuration::parse(label).map(|d| d.seconds()).unwrap_or(0)
}

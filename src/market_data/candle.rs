// =============================================================================
// Candles and candle series
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::CandleDuration;

/// One OHLC(V) bar. `time` is the bar's open time in UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Candle {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Time-ascending candles for one instrument/duration pair, with the parallel
/// close/high/low arrays the indicators consume.
///
/// Construction is the only place the ordering invariant is checked; a series
/// is never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CandleSeries {
    instrument: String,
    duration: CandleDuration,
    candles: Vec<Candle>,
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
}

impl CandleSeries {
    /// Build a series, rejecting duplicate or descending timestamps.
    pub fn new(
        instrument: impl Into<String>,
        duration: CandleDuration,
        candles: Vec<Candle>,
    ) -> Result<Self, EngineError> {
        if let Some(w) = candles.windows(2).find(|w| w[1].time <= w[0].time) {
            return Err(EngineError::DataUnavailable {
                reason: format!(
                    "candles out of order: {} followed by {}",
                    w[0].time, w[1].time
                ),
            });
        }

        let closes = candles.iter().map(|c| c.close).collect();
        let highs = candles.iter().map(|c| c.high).collect();
        let lows = candles.iter().map(|c| c.low).collect();

        Ok(Self {
            instrument: instrument.into(),
            duration,
            candles,
            closes,
            highs,
            lows,
        })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn duration(&self) -> CandleDuration {
        self.duration
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

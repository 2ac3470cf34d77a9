// Shared fixtures for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use crate::market_data::{Candle, CandleBuffer, CandleKey, CandleSeries};
use crate::optimizer::Optimizer;
use crate::params::ParameterSet;
use crate::types::CandleDuration;

pub const INSTRUMENT: &str = "BTC_JPY";

pub fn bar_time(index: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(index as i64)
}

/// Candle whose high and low equal the close.
pub fn flat_candle(index: usize, close: f64) -> Candle {
    Candle::new(bar_time(index), close, close, close, close)
}

pub fn series_from_closes(closes: &[f64]) -> CandleSeries {
    let candles = closes
        .iter()
        .enumerate()
        .map(|(i, &c)| flat_candle(i, c))
        .collect();
    CandleSeries::new(INSTRUMENT, CandleDuration::OneMinute, candles).unwrap()
}

pub fn series_from_candles(candles: Vec<Candle>) -> CandleSeries {
    CandleSeries::new(INSTRUMENT, CandleDuration::OneMinute, candles).unwrap()
}

/// Only the EMA pair enabled.
pub fn ema_params(fast: usize, slow: usize) -> ParameterSet {
    let mut params = ParameterSet::disabled();
    params.moving_average.enabled = true;
    params.moving_average.fast_period = fast;
    params.moving_average.slow_period = slow;
    params
}

/// One-minute buffer holding flat candles with the given closes.
pub fn buffer_with_closes(closes: &[f64]) -> CandleBuffer {
    let buffer = CandleBuffer::new(closes.len().max(1));
    let key = CandleKey::new(INSTRUMENT, CandleDuration::OneMinute);
    buffer.extend(&key, closes.iter().enumerate().map(|(i, &c)| flat_candle(i, c)));
    buffer
}

/// Replays scripted answers, then keeps returning `fallback`.
pub struct ScriptedOptimizer {
    script: Mutex<VecDeque<Option<ParameterSet>>>,
    fallback: Option<ParameterSet>,
    calls: AtomicUsize,
}

impl ScriptedOptimizer {
    pub fn new(script: Vec<Option<ParameterSet>>, fallback: Option<ParameterSet>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Optimizer for ScriptedOptimizer {
    fn optimize(&self, _series: &CandleSeries) -> Option<ParameterSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

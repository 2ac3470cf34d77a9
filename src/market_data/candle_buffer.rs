use std::collections::{HashMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Candle, CandleSeries, CandleSource};
use crate::types::CandleDuration;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub instrument: String,
    pub duration: CandleDuration,
}

impl CandleKey {
    pub fn new(instrument: impl Into<String>, duration: CandleDuration) -> Self {
        Self {
            instrument: instrument.into(),
            duration,
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.instrument, self.duration)
    }
}

// ---------------------------------------------------------------------------
// CandleBuffer -- ring buffer per (instrument, duration)
// ---------------------------------------------------------------------------

/// Ring buffer holding the most recent candles per `(instrument, duration)`.
///
/// Feeds backtests (see [`preload`](Self::preload)) and tests through
/// [`CandleSource`]. Appends are strictly time-ascending: a candle with the
/// same time as the newest entry replaces it, an older candle is dropped.
pub struct CandleBuffer {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    max_candles: usize,
}

impl CandleBuffer {
    pub fn new(max_candles: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_candles,
        }
    }

    /// Insert a candle, replacing the newest entry when the times match.
    pub fn update(&self, key: CandleKey, candle: Candle) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));

        if let Some(last) = ring.back() {
            if candle.time < last.time {
                warn!(key = %key, time = %candle.time, newest = %last.time, "dropping out-of-order candle");
                return;
            }
            if candle.time == last.time {
                ring.pop_back();
            }
        }

        ring.push_back(candle);
        while ring.len() > self.max_candles {
            ring.pop_front();
        }
    }

    pub fn extend(&self, key: &CandleKey, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.update(key.clone(), candle);
        }
    }

    /// Most recent `count` candles, oldest first.
    pub fn get(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Fill from `source` once. Backtests replay this history every cycle
    /// instead of hitting the exchange again.
    pub async fn preload(
        &self,
        source: &dyn CandleSource,
        key: &CandleKey,
        count: usize,
    ) -> Result<usize> {
        let series = source
            .get_candles(&key.instrument, key.duration, count)
            .await?;
        self.extend(key, series.candles().iter().cloned());

        let loaded = self.count(key);
        info!(
            key = %key,
            requested = count,
            loaded,
            last_close = ?self.last_close(key),
            "candle history preloaded"
        );
        Ok(loaded)
    }

    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key).and_then(|ring| ring.back().map(|c| c.close))
    }

    pub fn count(&self, key: &CandleKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl CandleSource for CandleBuffer {
    async fn get_candles(
        &self,
        instrument: &str,
        duration: CandleDuration,
        count: usize,
    ) -> Result<CandleSeries> {
        let key = CandleKey::new(instrument, duration);
        let candles = self.get(&key, count);
        debug!(key = %key, requested = count, returned = candles.len(), "candles served from buffer");
        Ok(CandleSeries::new(instrument, duration, candles)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_candle(minute: i64, close: f64) -> Candle {
        let time = Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap();
        Candle::new(time, close, close + 1.0, close - 1.0, close)
    }

    fn key() -> CandleKey {
        CandleKey::new("BTC_JPY", CandleDuration::OneMinute)
    }

    #[test]
    fn ring_buffer_trimming() {
        let buf = CandleBuffer::new(3);
        for i in 0..5 {
            buf.update(key(), sample_candle(i, 100.0 + i as f64));
        }

        assert_eq!(buf.count(&key()), 3);
        let closes: Vec<f64> = buf.get(&key(), 10).iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn same_time_replaces_newest() {
        let buf = CandleBuffer::new(10);
        buf.update(key(), sample_candle(0, 50.0));
        buf.update(key(), sample_candle(0, 52.0));
        assert_eq!(buf.count(&key()), 1);
        assert_eq!(buf.last_close(&key()), Some(52.0));
    }

    #[test]
    fn older_candle_is_dropped() {
        let buf = CandleBuffer::new(10);
        buf.update(key(), sample_candle(5, 50.0));
        buf.update(key(), sample_candle(1, 40.0));
        assert_eq!(buf.count(&key()), 1);
        assert_eq!(buf.last_close(&key()), Some(50.0));
    }

    #[test]
    fn last_close_empty_returns_none() {
        let buf = CandleBuffer::new(10);
        assert_eq!(buf.last_close(&CandleKey::new("ETH_JPY", CandleDuration::OneHour)), None);
    }

    #[tokio::test]
    async fn serves_newest_candles_as_series() {
        let buf = CandleBuffer::new(100);
        buf.extend(&key(), (0..10).map(|i| sample_candle(i, i as f64)));

        let series = buf
            .get_candles("BTC_JPY", CandleDuration::OneMinute, 4)
            .await
            .unwrap();
        assert_eq!(series.closes(), &[6.0, 7.0, 8.0, 9.0]);
        assert_eq!(series.instrument(), "BTC_JPY");
    }

    #[tokio::test]
    async fn preload_copies_newest_window() {
        let upstream = CandleBuffer::new(100);
        upstream.extend(&key(), (0..20).map(|i| sample_candle(i, i as f64)));

        let buf = CandleBuffer::new(5);
        let loaded = buf.preload(&upstream, &key(), 8).await.unwrap();
        // Trimmed to the ring size.
        assert_eq!(loaded, 5);
        assert_eq!(buf.last_close(&key()), Some(19.0));

        let series = buf
            .get_candles("BTC_JPY", CandleDuration::OneMinute, 5)
            .await
            .unwrap();
        assert_eq!(series.closes(), &[15.0, 16.0, 17.0, 18.0, 19.0]);
    }

    #[tokio::test]
    async fn preload_of_unknown_series_is_empty() {
        let upstream = CandleBuffer::new(10);
        let buf = CandleBuffer::new(10);
        assert_eq!(buf.preload(&upstream, &key(), 10).await.unwrap(), 0);
        assert_eq!(buf.last_close(&key()), None);
    }
}

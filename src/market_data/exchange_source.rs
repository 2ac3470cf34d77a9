// =============================================================================
// Exchange-backed candle source
// =============================================================================
//
// The kline endpoint pages by calendar day (by year for hourly candles), so
// a window of `count` candles is assembled by walking backwards from today
// until enough candles are collected or the page limit runs out.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, warn};

use super::{Candle, CandleSeries, CandleSource};
use crate::exchange::client::{kline_date, ExchangeClient};
use crate::types::CandleDuration;

/// Upper bound on kline pages fetched for one window.
const MAX_PAGES: usize = 60;

pub struct ExchangeCandleSource {
    client: Arc<ExchangeClient>,
    /// Symbol used on the public market-data endpoints (e.g. "BTC" for the
    /// "BTC_JPY" margin product).
    market_symbol: String,
}

impl ExchangeCandleSource {
    pub fn new(client: Arc<ExchangeClient>, market_symbol: impl Into<String>) -> Self {
        Self {
            client,
            market_symbol: market_symbol.into(),
        }
    }
}

#[async_trait]
impl CandleSource for ExchangeCandleSource {
    async fn get_candles(
        &self,
        instrument: &str,
        duration: CandleDuration,
        count: usize,
    ) -> Result<CandleSeries> {
        let interval = duration.exchange_interval();
        let step = if duration == CandleDuration::OneHour {
            Duration::days(365)
        } else {
            Duration::days(1)
        };

        // Keyed by time: dedups overlapping pages and keeps ascending order.
        let mut by_time: BTreeMap<_, Candle> = BTreeMap::new();
        let mut day = Utc::now();

        for page in 0..MAX_PAGES {
            if by_time.len() >= count {
                break;
            }
            let date = kline_date(interval, day);
            match self
                .client
                .get_klines(&self.market_symbol, interval, &date)
                .await
            {
                Ok(candles) => {
                    debug!(page, date = %date, fetched = candles.len(), "kline page");
                    for c in candles {
                        by_time.insert(c.time, c);
                    }
                }
                // Today's page may not exist yet right after the daily rollover.
                Err(e) if page == 0 => {
                    warn!(date = %date, error = %e, "first kline page unavailable");
                }
                Err(e) => return Err(e),
            }
            day -= step;
        }

        let mut candles: Vec<Candle> = by_time.into_values().collect();
        let start = candles.len().saturating_sub(count);
        candles.drain(..start);

        Ok(CandleSeries::new(instrument, duration, candles)?)
    }
}

pub mod candle;
pub mod candle_buffer;
pub mod exchange_source;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::CandleDuration;

// Re-export for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::{Candle, CandleSeries};
pub use candle_buffer::{CandleBuffer, CandleKey};
pub use exchange_source::ExchangeCandleSource;

/// Where the engine gets its candle window each cycle. Implementations must
/// return candles in strictly ascending time order.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn get_candles(
        &self,
        instrument: &str,
        duration: CandleDuration,
        count: usize,
    ) -> Result<CandleSeries>;
}

#[async_trait]
impl<T: CandleSource + ?Sized> CandleSource for Arc<T> {
    async fn get_candles(
        &self,
        instrument: &str,
        duration: CandleDuration,
        count: usize,
    ) -> Result<CandleSeries> {
        (**self).get_candles(instrument, duration, count).await
    }
}

// exchange/traits.rs

use async_trait::async_trait;

use super::ExchangeError;
use crate::backtest::{Candle, Timeframe};

/// Source of historical OHLCV candles.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Up to `limit` most recent candles, oldest first, with strictly
    /// increasing timestamps.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;
}

// =================================================================
// exchange/types.rs - Data Structures
// =================================================================

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::backtest::Timeframe;

/// Binance caps a single klines request at this many rows.
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Parameters for one klines request
#[derive(Debug, Clone)]
pub struct KlineParams {
    pub symbol: String,
    pub interval: Timeframe,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

impl KlineParams {
    pub fn new(symbol: String, interval: Timeframe) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            interval,
            end_time: None,
            limit: None,
        }
    }

    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query string pairs in the order Binance documents them.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.as_str().to_string()),
        ];

        if let Some(end_time) = self.end_time {
            query.push(("endTime", end_time.timestamp_millis().to_string()));
        }

        if let Some(limit) = self.limit {
            query.push(("limit", limit.min(MAX_KLINES_PER_REQUEST).to_string()));
        }

        query
    }
}

/// Error body returned by the Binance REST API
#[derive(Debug, Deserialize)]
pub struct BinanceErrorResponse {
    pub code: i64,
    pub msg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_kline_params_query() {
        let end = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let params = KlineParams::new("btcusdt".to_string(), Timeframe::H4)
            .with_limit(5000)
            .with_end_time(end);

        assert_eq!(params.symbol, "BTCUSDT");
        let query = params.query();
        assert_eq!(query[0], ("symbol", "BTCUSDT".to_string()));
        assert_eq!(query[1], ("interval", "4h".to_string()));
        assert!(query.contains(&("endTime", "1700000000000".to_string())));
        // Capped at the per-request maximum.
        assert!(query.contains(&("limit", "1000".to_string())));
        assert_eq!(query.len(), 4);
    }
}

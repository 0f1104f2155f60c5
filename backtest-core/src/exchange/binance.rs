// =================================================================
// exchange/binance.rs - Binance Klines Implementation
// =================================================================

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    errors::ExchangeError,
    traits::CandleSource,
    types::{BinanceErrorResponse, KlineParams, MAX_KLINES_PER_REQUEST},
    utils::{normalize_candles, parse_kline_row, validate_binance_symbol},
};
use crate::backtest::{Candle, Timeframe};
use crate::config::ExchangeSettings;

// Constants
pub const BINANCE_API_URL: &str = "https://api.binance.com";
pub const BINANCE_TESTNET_API_URL: &str = "https://testnet.binance.vision";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Binance error code for an unknown trading pair.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Binance spot market data over REST
pub struct BinanceExchange {
    api_url: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl BinanceExchange {
    /// Create a new Binance exchange instance
    pub fn new() -> Self {
        Self {
            api_url: BINANCE_API_URL.to_string(),
            client: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn testnet() -> Self {
        Self::new().with_api_url(BINANCE_TESTNET_API_URL)
    }

    pub fn from_settings(settings: &ExchangeSettings) -> Self {
        let exchange = if settings.testnet {
            Self::testnet()
        } else {
            Self::new().with_api_url(settings.api_url.as_str())
        };

        exchange.with_timeout(Duration::from_secs(settings.request_timeout_secs))
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Fetch a single page of klines
    async fn fetch_klines_page(&self, params: &KlineParams) -> Result<Vec<Candle>, ExchangeError> {
        let url = format!("{}/api/v3/klines", self.api_url);
        debug!("Fetching klines from {} with {:?}", url, params.query());

        let response = self
            .client
            .get(&url)
            .query(&params.query())
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_http_error(status, &error_text, &params.symbol));
        }

        let body = response.text().await?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&body)?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            match parse_kline_row(row) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!("Skipping malformed kline: {}", e),
            }
        }

        Ok(candles)
    }

    /// Page backwards from the most recent candle until `limit` rows are collected.
    async fn fetch_klines(&self, symbol: String, interval: Timeframe, limit: u32) -> Result<Vec<Candle>, ExchangeError> {
        let mut pages: VecDeque<Vec<Candle>> = VecDeque::new();
        let mut remaining = limit;
        let mut end_time = None;

        while remaining > 0 {
            let page_limit = remaining.min(MAX_KLINES_PER_REQUEST);
            let mut params = KlineParams::new(symbol.clone(), interval).with_limit(page_limit);
            if let Some(end) = end_time {
                params = params.with_end_time(end);
            }

            let page = self.fetch_klines_page(&params).await?;
            let received = page.len() as u32;
            let Some(first) = page.first() else {
                break;
            };

            end_time = Some(first.timestamp - ChronoDuration::milliseconds(1));
            remaining = remaining.saturating_sub(received);
            pages.push_front(page);

            if received < page_limit {
                debug!("History exhausted for {} {}", symbol, interval);
                break;
            }
        }

        Ok(normalize_candles(pages.into_iter().flatten().collect()))
    }
}

fn map_http_error(status: StatusCode, body: &str, symbol: &str) -> ExchangeError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        return ExchangeError::RateLimit(format!("HTTP {}: {}", status, body));
    }

    if let Ok(api_error) = serde_json::from_str::<BinanceErrorResponse>(body) {
        if api_error.code == INVALID_SYMBOL_CODE {
            return ExchangeError::InvalidSymbol(format!("{}: {}", symbol, api_error.msg));
        }
        return ExchangeError::ApiError(format!(
            "HTTP {}: {} ({})",
            status, api_error.msg, api_error.code
        ));
    }

    ExchangeError::ApiError(format!("HTTP {}: {}", status, body))
}

#[async_trait]
impl CandleSource for BinanceExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let symbol = validate_binance_symbol(symbol)?;

        info!("Fetching {} {} candles for {}", limit, timeframe, symbol);
        let candles = self.fetch_klines(symbol.clone(), timeframe, limit).await?;

        info!(
            "Successfully fetched {} candles for {} {}",
            candles.len(),
            symbol,
            timeframe
        );
        Ok(candles)
    }
}

impl Default for BinanceExchange {
    fn default() -> Self {
        Self::new()
    }
}

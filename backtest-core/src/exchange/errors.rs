// backtest-core/src/exchange/errors.rs

use thiserror::Error;

/// Why a candle fetch failed. Every variant ends up as a `data_unavailable`
/// run failure; the message is what the user sees.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Could not reach the kline endpoint
    #[error("Network error: {0}")]
    NetworkError(String),

    /// HTTP 429, or 418 once Binance has banned the client IP
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Malformed pair name, or Binance code -1121
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Kline parse error: {0}")]
    ParseError(String),

    /// The per-request timeout elapsed
    #[error("Kline request timed out")]
    Timeout,

    #[error("Binance API error: {0}")]
    ApiError(String),
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else if err.is_connect() {
            ExchangeError::NetworkError(err.to_string())
        } else {
            ExchangeError::ApiError(err.to_string())
        }
    }
}

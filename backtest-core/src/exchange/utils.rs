// =================================================================
// exchange/utils.rs - Utility Functions
// =================================================================

use chrono::DateTime;
use serde_json::Value;

use super::ExchangeError;
use crate::backtest::Candle;

/// Convert one Binance kline row to a `Candle`.
///
/// Row layout: `[open_time, "open", "high", "low", "close", "volume", close_time, ...]`
pub fn parse_kline_row(row: &Value) -> Result<Candle, ExchangeError> {
    let fields = row
        .as_array()
        .ok_or_else(|| ExchangeError::ParseError(format!("Kline row is not an array: {}", row)))?;

    if fields.len() < 6 {
        return Err(ExchangeError::ParseError(format!(
            "Kline row has {} fields, expected at least 6",
            fields.len()
        )));
    }

    let open_time = fields[0]
        .as_i64()
        .ok_or_else(|| ExchangeError::ParseError(format!("Invalid open time: {}", fields[0])))?;
    let timestamp = DateTime::from_timestamp_millis(open_time)
        .ok_or_else(|| ExchangeError::ParseError("Invalid timestamp".to_string()))?;

    let open = parse_price(&fields[1], "open")?;
    let high = parse_price(&fields[2], "high")?;
    let low = parse_price(&fields[3], "low")?;
    let close = parse_price(&fields[4], "close")?;
    let volume = parse_price(&fields[5], "volume")?;

    // Validate parsed values
    if close <= 0.0 {
        return Err(ExchangeError::ParseError("Close must be positive".to_string()));
    }

    Ok(Candle::new(timestamp, open, high, low, close, volume))
}

/// Binance sends decimals as strings; plain numbers are accepted too.
fn parse_price(value: &Value, field: &str) -> Result<f64, ExchangeError> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ExchangeError::ParseError(format!("Invalid {} '{}'", field, value)))
}

/// Sort by open time and drop duplicate rows left by overlapping pages.
pub fn normalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

/// Validate symbol format for Binance
pub fn validate_binance_symbol(symbol: &str) -> Result<String, ExchangeError> {
    if symbol.is_empty() {
        return Err(ExchangeError::InvalidSymbol("Symbol cannot be empty".to_string()));
    }

    let symbol = symbol.to_uppercase();

    // Basic validation: should be alphanumeric and reasonable length
    if !symbol.chars().all(char::is_alphanumeric) {
        return Err(ExchangeError::InvalidSymbol(format!(
            "Symbol '{}' contains invalid characters",
            symbol
        )));
    }

    if symbol.len() < 3 || symbol.len() > 20 {
        return Err(ExchangeError::InvalidSymbol(format!(
            "Symbol '{}' has invalid length",
            symbol
        )));
    }

    Ok(symbol)
}

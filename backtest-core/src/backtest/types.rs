// backtest-core/src/backtest/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{RunError, ValidationError};

/// Lower bound (inclusive) for both RSI thresholds.
pub const RSI_THRESHOLD_MIN: f64 = 20.0;
/// Upper bound (inclusive) for both RSI thresholds.
pub const RSI_THRESHOLD_MAX: f64 = 80.0;

// 基础行情数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Candle interval. Only intervals Binance serves are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 14] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::D3,
        Timeframe::W1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M3 => 3,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H2 => 120,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
            Timeframe::H8 => 480,
            Timeframe::H12 => 720,
            Timeframe::D1 => 1_440,
            Timeframe::D3 => 4_320,
            Timeframe::W1 => 10_080,
        }
    }

    /// Number of candles in a year. Crypto markets trade around the clock,
    /// so there is no 252-day session calendar here.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Timeframe::W1 => 52.0,
            _ => 365.0 * 1_440.0 / self.minutes() as f64,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == trimmed)
            .ok_or_else(|| ValidationError::UnknownTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// RSI thresholds, validated once at construction.
///
/// `rsi_buy` may sit above or below `rsi_sell`; the pair is not
/// cross-checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStrategyParams")]
pub struct StrategyParams {
    rsi_buy: f64,
    rsi_sell: f64,
}

#[derive(Deserialize)]
struct RawStrategyParams {
    rsi_buy: f64,
    rsi_sell: f64,
}

impl TryFrom<RawStrategyParams> for StrategyParams {
    type Error = ValidationError;

    fn try_from(raw: RawStrategyParams) -> Result<Self, Self::Error> {
        Self::new(raw.rsi_buy, raw.rsi_sell)
    }
}

impl StrategyParams {
    pub fn new(rsi_buy: f64, rsi_sell: f64) -> Result<Self, ValidationError> {
        check_threshold("rsi_buy", rsi_buy)?;
        check_threshold("rsi_sell", rsi_sell)?;
        Ok(Self { rsi_buy, rsi_sell })
    }

    pub fn rsi_buy(&self) -> f64 {
        self.rsi_buy
    }

    pub fn rsi_sell(&self) -> f64 {
        self.rsi_sell
    }
}

fn check_threshold(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(RSI_THRESHOLD_MIN..=RSI_THRESHOLD_MAX).contains(&value) {
        return Err(ValidationError::ThresholdOutOfRange {
            name,
            value,
            min: RSI_THRESHOLD_MIN,
            max: RSI_THRESHOLD_MAX,
        });
    }
    Ok(())
}

// 交易信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    None,
    Enter,
    Exit,
}

// 已平仓交易
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_index: usize,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_price: f64,
    /// Fractional return, `0.05` is +5%.
    pub return_pct: f64,
    /// Candles between entry and exit.
    pub holding_period: usize,
    /// Closed at the last candle because the series ended, not by an exit signal.
    pub forced_close: bool,
}

/// A ratio or statistic that may have no defined value.
///
/// Serialized as a JSON number, or `null` when undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum MetricValue {
    Value(f64),
    Undefined,
}

impl MetricValue {
    /// Non-finite inputs collapse to `Undefined`.
    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            MetricValue::Value(value)
        } else {
            MetricValue::Undefined
        }
    }

    /// `numerator / denominator`, undefined when the denominator is zero.
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() {
            MetricValue::Undefined
        } else {
            Self::new(numerator / denominator)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, MetricValue::Undefined)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetricValue::Undefined, MetricValue::new)
    }
}

impl From<MetricValue> for Option<f64> {
    fn from(value: MetricValue) -> Self {
        value.value()
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{:.2}", v),
            MetricValue::Undefined => f.write_str("n/a"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub candles_used: usize,
    /// First candle index where every indicator is defined.
    pub first_defined_index: usize,
    pub execution_time_ms: f64,
}

// 性能指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub profit_factor: MetricValue,
    pub win_rate_pct: MetricValue,
    pub sharpe_ratio: MetricValue,
    pub sortino_ratio: MetricValue,
    /// Always <= 0.
    pub max_drawdown_pct: f64,
    pub calmar_ratio: MetricValue,
    pub recovery_factor: MetricValue,
    pub total_return_pct: f64,
    pub total_trades: usize,

    pub wins: usize,
    pub losses: usize,
    pub forced_close_trades: usize,
    pub avg_win_pct: MetricValue,
    pub avg_loss_pct: MetricValue,
    pub gross_profit_pct: f64,
    pub gross_loss_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    pub execution: ExecutionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Outcome of one (symbol, timeframe, params) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub params: StrategyParams,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics: Option<MetricsRecord>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RunError>,
}

impl RunResult {
    pub fn success(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        params: StrategyParams,
        metrics: MetricsRecord,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            params,
            status: RunStatus::Success,
            metrics: Some(metrics),
            error: None,
        }
    }

    pub fn failure(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        params: StrategyParams,
        error: RunError,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            params,
            status: RunStatus::Failure,
            metrics: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

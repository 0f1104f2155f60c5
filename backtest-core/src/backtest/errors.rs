// backtest-core/src/backtest/errors.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exchange::ExchangeError;

/// Rejected request parameters. Surfaced before any run starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{name} must be within [{min}, {max}], got {value}")]
    ThresholdOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("limit must be within [{min}, {max}], got {value}")]
    LimitOutOfRange { value: u32, min: u32, max: u32 },

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("{0} list cannot be empty")]
    EmptyList(&'static str),

    #[error("Concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("Invalid optimization grid: {0}")]
    InvalidGrid(String),
}

/// Failure of a single backtest run.
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Insufficient data: need at least {required} candles, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Data unavailable: {0}")]
    DataUnavailable(#[from] ExchangeError),

    #[error("Invalid candle series: {0}")]
    InvalidSeries(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    InsufficientData,
    DataUnavailable,
    InvalidSeries,
    Timeout,
    /// The run's task panicked or was cancelled outside the deadline.
    Internal,
}

/// Serializable failure reason attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
}

impl RunError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Internal,
            message: message.into(),
        }
    }
}

impl From<&BacktestError> for RunError {
    fn from(err: &BacktestError) -> Self {
        let kind = match err {
            BacktestError::InsufficientData { .. } => RunErrorKind::InsufficientData,
            BacktestError::DataUnavailable(_) => RunErrorKind::DataUnavailable,
            BacktestError::InvalidSeries(_) => RunErrorKind::InvalidSeries,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<BacktestError> for RunError {
    fn from(err: BacktestError) -> Self {
        RunError::from(&err)
    }
}

// backtest-core/src/backtest/indicators.rs

use serde::{Deserialize, Serialize};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;

use super::errors::BacktestError;
use super::types::Candle;

pub const RSI_PERIOD: usize = 14;
pub const FAST_EMA_PERIOD: usize = 20;
pub const SLOW_EMA_PERIOD: usize = 50;

/// Shortest series that yields at least one fully defined frame entry.
pub const MIN_CANDLES: usize = SLOW_EMA_PERIOD;

/// Binary trend classification from the fast/slow EMA pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub rsi: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub direction: Direction,
}

/// Indicator values aligned 1:1 with the input candles.
///
/// Entries before the lookback window fills are `None` and never trade.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    points: Vec<Option<IndicatorPoint>>,
    first_defined: usize,
}

impl IndicatorFrame {
    pub(crate) fn from_points(points: Vec<Option<IndicatorPoint>>) -> Self {
        let first_defined = points
            .iter()
            .position(Option::is_some)
            .unwrap_or(points.len());
        Self {
            points,
            first_defined,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IndicatorPoint> {
        self.points.get(index).and_then(Option::as_ref)
    }

    pub fn first_defined_index(&self) -> usize {
        self.first_defined
    }

    /// `(candle_index, point)` for every defined entry, in order.
    pub fn defined(&self) -> impl Iterator<Item = (usize, &IndicatorPoint)> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }

    /// Most recent defined entry.
    pub fn latest(&self) -> Option<(usize, &IndicatorPoint)> {
        self.points
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, p)| p.as_ref().map(|p| (i, p)))
    }
}

/// Computes RSI and trend direction over a candle series.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorEngine {
    rsi_period: usize,
    fast_period: usize,
    slow_period: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            rsi_period: RSI_PERIOD,
            fast_period: FAST_EMA_PERIOD,
            slow_period: SLOW_EMA_PERIOD,
        }
    }
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first candle at which both indicators are defined.
    pub fn warmup(&self) -> usize {
        self.rsi_period.max(self.slow_period - 1)
    }

    pub fn min_candles(&self) -> usize {
        self.warmup() + 1
    }

    pub fn compute(&self, candles: &[Candle]) -> Result<IndicatorFrame, BacktestError> {
        if candles.len() < self.min_candles() {
            return Err(BacktestError::InsufficientData {
                required: self.min_candles(),
                actual: candles.len(),
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = wilder_rsi(&closes, self.rsi_period);
        let fast = ema_series(&closes, self.fast_period)?;
        let slow = ema_series(&closes, self.slow_period)?;

        let points = (0..closes.len())
            .map(|i| match (rsi[i], fast[i], slow[i]) {
                (Some(rsi), Some(fast), Some(slow)) => Some(IndicatorPoint {
                    rsi,
                    fast_ema: fast,
                    slow_ema: slow,
                    direction: if fast > slow {
                        Direction::Bullish
                    } else {
                        Direction::Bearish
                    },
                }),
                _ => None,
            })
            .collect();

        Ok(IndicatorFrame::from_points(points))
    }
}

/// RSI with Wilder smoothing.
///
/// The first average is the simple mean of the first `period` deltas, after
/// which `avg = (avg * (period - 1) + x) / period`. A window without any
/// movement reads 50.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return result;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let n = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / n;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / n;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (n - 1.0) + gains[i]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[i]) / n;
        result[i + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// EMA seeded at the first close; defined once `period` closes have been seen.
fn ema_series(closes: &[f64], period: usize) -> Result<Vec<Option<f64>>, BacktestError> {
    let mut ema = ExponentialMovingAverage::new(period)
        .map_err(|e| BacktestError::InvalidSeries(format!("EMA({}) setup: {:?}", period, e)))?;

    Ok(closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = ema.next(close);
            (i + 1 >= period).then_some(value)
        })
        .collect())
}

/// Rejects series that are out of order or carry unusable prices.
pub fn validate_series(candles: &[Candle]) -> Result<(), BacktestError> {
    if let Some(pos) = candles.iter().position(|c| !(c.close.is_finite() && c.close > 0.0)) {
        return Err(BacktestError::InvalidSeries(format!(
            "non-positive close at index {}",
            pos
        )));
    }

    if let Some(pos) = candles
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(BacktestError::InvalidSeries(format!(
            "timestamps not strictly increasing at index {}",
            pos + 1
        )));
    }

    Ok(())
}

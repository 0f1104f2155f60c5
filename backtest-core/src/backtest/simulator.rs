// backtest-core/src/backtest/simulator.rs

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{Candle, Signal, Trade};

/// Cumulative equity per candle, starting from 1.0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquityCurve(Vec<f64>);

impl EquityCurve {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn final_value(&self) -> f64 {
        self.0.last().copied().unwrap_or(1.0)
    }

    /// Candle-to-candle relative changes.
    pub fn period_returns(&self) -> Vec<f64> {
        self.0
            .windows(2)
            .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
            .collect()
    }
}

impl From<Vec<f64>> for EquityCurve {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    entry_index: usize,
    entry_price: f64,
}

impl OpenPosition {
    fn close(self, exit_index: usize, exit_price: f64, forced_close: bool) -> Trade {
        Trade {
            entry_index: self.entry_index,
            entry_price: self.entry_price,
            exit_index,
            exit_price,
            return_pct: (exit_price - self.entry_price) / self.entry_price,
            holding_period: exit_index - self.entry_index,
            forced_close,
        }
    }
}

/// Walks the candles applying signals with fills at each signaled close.
///
/// Signals must be ordered by candle index. A position still open when the
/// series ends is force-closed at the final close. Zero signals is a valid
/// outcome and yields zero trades with a flat curve.
pub fn simulate<I>(candles: &[Candle], signals: I) -> SimulationResult
where
    I: IntoIterator<Item = (usize, Signal)>,
{
    let mut signals = signals.into_iter().peekable();
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(candles.len());
    let mut realized = 1.0_f64;
    let mut open: Option<OpenPosition> = None;

    for (i, candle) in candles.iter().enumerate() {
        while let Some(&(index, signal)) = signals.peek() {
            if index > i {
                break;
            }
            signals.next();
            if index < i {
                warn!("Dropping out-of-order signal at index {}", index);
                continue;
            }

            match (signal, open) {
                (Signal::Enter, None) => {
                    debug!("ENTER @ {} (index {})", candle.close, i);
                    open = Some(OpenPosition {
                        entry_index: i,
                        entry_price: candle.close,
                    });
                }
                (Signal::Exit, Some(position)) => {
                    let trade = position.close(i, candle.close, false);
                    debug!(
                        "EXIT @ {} (index {}), return {:.4}",
                        candle.close, i, trade.return_pct
                    );
                    realized *= 1.0 + trade.return_pct;
                    trades.push(trade);
                    open = None;
                }
                (Signal::Enter, Some(_)) | (Signal::Exit, None) => {
                    debug!("Ignoring redundant {:?} at index {}", signal, i);
                }
                (Signal::None, _) => {}
            }
        }

        equity.push(match open {
            Some(position) => realized * candle.close / position.entry_price,
            None => realized,
        });
    }

    if let (Some(position), Some(last)) = (open, candles.last()) {
        let trade = position.close(candles.len() - 1, last.close, true);
        debug!("Force-closing open position at series end, return {:.4}", trade.return_pct);
        realized *= 1.0 + trade.return_pct;
        trades.push(trade);
        if let Some(tail) = equity.last_mut() {
            *tail = realized;
        }
    }

    SimulationResult {
        trades,
        equity_curve: EquityCurve(equity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(start + Duration::days(i as i64), c, c, c, c, 1.0))
            .collect()
    }

    #[test]
    fn test_round_trip_trade() {
        let candles = candles_from(&[100.0, 110.0, 121.0, 100.0]);
        let result = simulate(&candles, vec![(0, Signal::Enter), (2, Signal::Exit)]);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_index, 0);
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.holding_period, 2);
        assert!((trade.return_pct - 0.21).abs() < 1e-12);
        assert!(!trade.forced_close);

        let curve = result.equity_curve.values();
        assert_eq!(curve.len(), 4);
        assert!((curve[1] - 1.1).abs() < 1e-12);
        assert!((curve[2] - 1.21).abs() < 1e-12);
        // Flat after the exit.
        assert!((curve[3] - 1.21).abs() < 1e-12);
    }

    #[test]
    fn test_forced_close_at_series_end() {
        let candles = candles_from(&[100.0, 90.0, 95.0]);
        let result = simulate(&candles, vec![(1, Signal::Enter)]);

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert!(trade.forced_close);
        assert_eq!(trade.exit_index, 2);
        assert_eq!(trade.exit_price, 95.0);
        assert!((result.equity_curve.final_value() - 95.0 / 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_redundant_signals_keep_single_position() {
        let candles = candles_from(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let result = simulate(
            &candles,
            vec![
                (0, Signal::Exit),
                (1, Signal::Enter),
                (2, Signal::Enter),
                (3, Signal::Exit),
                (4, Signal::Exit),
            ],
        );

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].entry_index, 1);
        assert_eq!(result.trades[0].exit_index, 3);
    }

    #[test]
    fn test_trades_never_overlap() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        let candles = candles_from(&closes);
        let signals: Vec<(usize, Signal)> = (0..40)
            .map(|i| match i % 3 {
                0 => (i, Signal::Enter),
                1 => (i, Signal::Enter),
                _ => (i, Signal::Exit),
            })
            .collect();
        let result = simulate(&candles, signals);

        for pair in result.trades.windows(2) {
            assert!(pair[0].exit_index < pair[1].entry_index);
        }
        for trade in &result.trades {
            assert!(trade.exit_index >= trade.entry_index);
        }
    }

    #[test]
    fn test_no_signals_yields_no_trades() {
        let candles = candles_from(&[100.0, 101.0, 99.0]);
        let result = simulate(&candles, Vec::new());

        assert!(result.trades.is_empty());
        assert_eq!(result.equity_curve.values(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_period_returns() {
        let curve = EquityCurve::from(vec![1.0, 1.1, 0.99]);
        let returns = curve.period_returns();
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
    }
}

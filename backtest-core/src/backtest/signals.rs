// backtest-core/src/backtest/signals.rs

use super::indicators::{Direction, IndicatorFrame, IndicatorPoint};
use super::types::{Signal, StrategyParams};

/// Position state threaded through the per-candle walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    InPosition,
}

impl PositionState {
    /// Evaluates one candle and returns the signal plus the next state.
    ///
    /// Only one transition fires per candle: an exit is never followed by a
    /// re-entry on the same candle.
    pub fn step(self, point: &IndicatorPoint, params: &StrategyParams) -> (Signal, PositionState) {
        match self {
            PositionState::Flat => {
                if point.rsi < params.rsi_buy() && point.direction == Direction::Bullish {
                    (Signal::Enter, PositionState::InPosition)
                } else {
                    (Signal::None, PositionState::Flat)
                }
            }
            PositionState::InPosition => {
                if point.rsi > params.rsi_sell() || point.direction == Direction::Bearish {
                    (Signal::Exit, PositionState::Flat)
                } else {
                    (Signal::None, PositionState::InPosition)
                }
            }
        }
    }
}

/// Lazy `(candle_index, Signal)` stream over the defined part of a frame.
pub struct SignalGenerator<'a> {
    frame: &'a IndicatorFrame,
    params: &'a StrategyParams,
    state: PositionState,
    cursor: usize,
}

impl<'a> SignalGenerator<'a> {
    pub fn new(frame: &'a IndicatorFrame, params: &'a StrategyParams) -> Self {
        Self {
            frame,
            params,
            state: PositionState::Flat,
            cursor: frame.first_defined_index(),
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }
}

impl Iterator for SignalGenerator<'_> {
    type Item = (usize, Signal);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.frame.len() {
            let index = self.cursor;
            self.cursor += 1;

            if let Some(point) = self.frame.get(index) {
                let (signal, next_state) = self.state.step(point, self.params);
                self.state = next_state;
                return Some((index, signal));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.frame.len().saturating_sub(self.cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(rsi: f64, direction: Direction) -> IndicatorPoint {
        let (fast_ema, slow_ema) = match direction {
            Direction::Bullish => (101.0, 100.0),
            Direction::Bearish => (99.0, 100.0),
        };
        IndicatorPoint {
            rsi,
            fast_ema,
            slow_ema,
            direction,
        }
    }

    fn run(points: &[IndicatorPoint], params: &StrategyParams) -> Vec<Signal> {
        let frame = IndicatorFrame::from_points(points.iter().copied().map(Some).collect());
        SignalGenerator::new(&frame, params).map(|(_, s)| s).collect()
    }

    #[test]
    fn test_enter_requires_low_rsi_and_bullish_trend() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let signals = run(
            &[
                point(40.0, Direction::Bearish),
                point(50.0, Direction::Bullish),
                point(40.0, Direction::Bullish),
            ],
            &params,
        );
        assert_eq!(signals, vec![Signal::None, Signal::None, Signal::Enter]);
    }

    #[test]
    fn test_exit_on_high_rsi_or_bearish_trend() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let signals = run(
            &[
                point(40.0, Direction::Bullish),
                point(60.0, Direction::Bullish),
                point(70.0, Direction::Bullish),
                point(40.0, Direction::Bullish),
                point(50.0, Direction::Bearish),
            ],
            &params,
        );
        assert_eq!(
            signals,
            vec![
                Signal::Enter,
                Signal::None,
                Signal::Exit,
                Signal::Enter,
                Signal::Exit
            ]
        );
    }

    #[test]
    fn test_no_nested_enter_while_in_position() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let signals = run(&[point(30.0, Direction::Bullish); 5], &params);
        assert_eq!(
            signals,
            vec![
                Signal::Enter,
                Signal::None,
                Signal::None,
                Signal::None,
                Signal::None
            ]
        );
    }

    #[test]
    fn test_no_reentry_on_exit_candle() {
        // Buy threshold above sell threshold: a single candle satisfies both
        // the exit and the entry rule, but only the exit fires.
        let params = StrategyParams::new(70.0, 30.0).unwrap();
        let signals = run(&[point(50.0, Direction::Bullish); 3], &params);
        assert_eq!(signals, vec![Signal::Enter, Signal::Exit, Signal::Enter]);
    }

    #[test]
    fn test_undefined_entries_are_skipped() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let frame = IndicatorFrame::from_points(vec![
            None,
            None,
            Some(point(30.0, Direction::Bullish)),
            Some(point(70.0, Direction::Bullish)),
        ]);
        let mut generator = SignalGenerator::new(&frame, &params);

        assert_eq!(generator.next(), Some((2, Signal::Enter)));
        assert_eq!(generator.state(), PositionState::InPosition);
        assert_eq!(generator.next(), Some((3, Signal::Exit)));
        assert_eq!(generator.state(), PositionState::Flat);
        assert_eq!(generator.next(), None);
    }

    #[test]
    fn test_exit_without_position_is_suppressed() {
        let params = StrategyParams::new(45.0, 65.0).unwrap();
        let signals = run(&[point(90.0, Direction::Bearish); 3], &params);
        assert!(signals.iter().all(|s| *s == Signal::None));
    }
}

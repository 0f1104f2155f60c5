pub mod errors;
pub mod indicators;
pub mod metrics;
pub mod runner;
pub mod signals;
pub mod simulator;
pub mod types;

pub use errors::{BacktestError, RunError, RunErrorKind, ValidationError};
pub use indicators::{Direction, IndicatorEngine, IndicatorFrame, MIN_CANDLES};
pub use metrics::MetricsCalculator;
pub use runner::{backtest_candles, BacktestReport, BacktestRunner, RunSpec};
pub use signals::{PositionState, SignalGenerator};
pub use simulator::{simulate, EquityCurve, SimulationResult};
pub use types::*;

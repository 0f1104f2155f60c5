// backtest-core/src/backtest/runner.rs

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::errors::{BacktestError, RunError};
use super::indicators::{validate_series, IndicatorEngine};
use super::metrics::MetricsCalculator;
use super::signals::SignalGenerator;
use super::simulator::{simulate, EquityCurve};
use super::types::*;
use crate::exchange::CandleSource;

/// One fully specified backtest combination.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: u32,
    pub params: StrategyParams,
}

/// Everything a single backtest produces.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub metrics: MetricsRecord,
    pub trades: Vec<Trade>,
    pub equity_curve: EquityCurve,
}

/// Runs the indicator, signal, simulation and metrics stages over candles
/// already in memory. Synchronous and deterministic.
pub fn backtest_candles(
    candles: &[Candle],
    timeframe: Timeframe,
    params: &StrategyParams,
) -> Result<BacktestReport, BacktestError> {
    let started = Instant::now();
    let engine = IndicatorEngine::new();

    validate_series(candles)?;
    let frame = engine.compute(candles)?;
    let simulation = simulate(candles, SignalGenerator::new(&frame, params));

    let execution = ExecutionMetadata {
        candles_used: candles.len(),
        first_defined_index: frame.first_defined_index(),
        execution_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
    };
    let metrics = MetricsCalculator::new(timeframe).calculate(
        &simulation.trades,
        &simulation.equity_curve,
        execution,
    );

    Ok(BacktestReport {
        metrics,
        trades: simulation.trades,
        equity_curve: simulation.equity_curve,
    })
}

/// Fetches candles and backtests a single combination, converting every
/// failure into a failed `RunResult`.
#[derive(Clone)]
pub struct BacktestRunner {
    source: Arc<dyn CandleSource>,
}

impl BacktestRunner {
    pub fn new(source: Arc<dyn CandleSource>) -> Self {
        Self { source }
    }

    pub async fn run(&self, spec: &RunSpec) -> RunResult {
        match self.try_run(spec).await {
            Ok(report) => {
                info!(
                    "{} {}: {} trades, total return {:.2}%, profit factor {}",
                    spec.symbol,
                    spec.timeframe,
                    report.metrics.total_trades,
                    report.metrics.total_return_pct,
                    report.metrics.profit_factor
                );
                RunResult::success(&spec.symbol, spec.timeframe, spec.params, report.metrics)
            }
            Err(e) => {
                warn!("{} {} failed: {}", spec.symbol, spec.timeframe, e);
                RunResult::failure(&spec.symbol, spec.timeframe, spec.params, RunError::from(&e))
            }
        }
    }

    async fn try_run(&self, spec: &RunSpec) -> Result<BacktestReport, BacktestError> {
        let candles = self
            .source
            .fetch_candles(&spec.symbol, spec.timeframe, spec.limit)
            .await?;
        debug!(
            "Fetched {} candles for {} {}",
            candles.len(),
            spec.symbol,
            spec.timeframe
        );

        backtest_candles(&candles, spec.timeframe, &spec.params)
    }
}

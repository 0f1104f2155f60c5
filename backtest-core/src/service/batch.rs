use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::{self, timeout_at};
use tracing::{debug, error, info, warn};

use super::errors::ServiceError;
use super::types::*;
use crate::backtest::indicators::validate_series;
use crate::backtest::{
    backtest_candles, BacktestError, BacktestRunner, IndicatorEngine, RunError, RunErrorKind,
    RunResult, RunSpec, StrategyParams, Timeframe, ValidationError, MIN_CANDLES,
    RSI_THRESHOLD_MAX, RSI_THRESHOLD_MIN,
};
use crate::exchange::CandleSource;

/// Threshold grid for `run_optimize`. Values are clipped to the valid RSI range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeGrid {
    pub buy_min: f64,
    pub buy_max: f64,
    pub sell_min: f64,
    pub sell_max: f64,
    pub step: f64,
}

impl Default for OptimizeGrid {
    fn default() -> Self {
        Self {
            buy_min: 30.0,
            buy_max: 65.0,
            sell_min: 65.0,
            sell_max: 80.0,
            step: 5.0,
        }
    }
}

impl OptimizeGrid {
    /// Every (buy, sell) pair with sell strictly above buy.
    pub fn pairs(&self) -> Result<Vec<StrategyParams>, ValidationError> {
        if !self.step.is_finite() || self.step <= 0.0 {
            return Err(ValidationError::InvalidGrid(format!(
                "step must be positive, got {}",
                self.step
            )));
        }

        let buys = grid_values(self.buy_min, self.buy_max, self.step)?;
        let sells = grid_values(self.sell_min, self.sell_max, self.step)?;

        let mut pairs = Vec::new();
        for &buy in &buys {
            for &sell in &sells {
                if sell > buy {
                    pairs.push(StrategyParams::new(buy, sell)?);
                }
            }
        }

        if pairs.is_empty() {
            return Err(ValidationError::InvalidGrid(
                "no pair with rsi_sell above rsi_buy".to_string(),
            ));
        }
        Ok(pairs)
    }
}

fn grid_values(min: f64, max: f64, step: f64) -> Result<Vec<f64>, ValidationError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(ValidationError::InvalidGrid("bounds must be finite".to_string()));
    }

    let lo = min.max(RSI_THRESHOLD_MIN);
    let hi = max.min(RSI_THRESHOLD_MAX);
    if lo > hi {
        return Err(ValidationError::InvalidGrid(format!(
            "range [{}, {}] is outside [{}, {}]",
            min, max, RSI_THRESHOLD_MIN, RSI_THRESHOLD_MAX
        )));
    }

    let count = ((hi - lo) / step + 1e-9).floor() as usize + 1;
    Ok((0..count).map(|i| lo + i as f64 * step).collect())
}

pub fn validate_limit(limit: u32) -> Result<(), ValidationError> {
    if !(LIMIT_MIN..=LIMIT_MAX).contains(&limit) {
        return Err(ValidationError::LimitOutOfRange {
            value: limit,
            min: LIMIT_MIN,
            max: LIMIT_MAX,
        });
    }
    Ok(())
}

/// A snapshot needs only one defined indicator entry.
const SNAPSHOT_LIMIT_MIN: u32 = MIN_CANDLES as u32;

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Entry point for single, batch and grid backtests over one candle source
#[derive(Clone)]
pub struct BacktestService {
    source: Arc<dyn CandleSource>,
    runner: BacktestRunner,
    top_k: usize,
}

impl BacktestService {
    pub fn new(source: Arc<dyn CandleSource>) -> Self {
        Self {
            runner: BacktestRunner::new(Arc::clone(&source)),
            source,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Backtest one combination. Only invalid parameters are an `Err`;
    /// run failures come back as a failed `RunResult`.
    pub async fn run_single(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        rsi_buy: f64,
        rsi_sell: f64,
    ) -> Result<RunResult, ServiceError> {
        validate_limit(limit)?;
        let params = StrategyParams::new(rsi_buy, rsi_sell)?;

        let spec = RunSpec {
            symbol: normalize_symbol(symbol),
            timeframe,
            limit,
            params,
        };
        Ok(self.runner.run(&spec).await)
    }

    /// Backtest every symbol x timeframe combination with bounded concurrency.
    ///
    /// Results are reported in symbol-major order regardless of completion
    /// order. When `deadline` elapses, outstanding runs are aborted and
    /// reported as timeout failures alongside the completed ones.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_batch(
        &self,
        symbols: &[String],
        timeframes: &[Timeframe],
        limit: u32,
        rsi_buy: f64,
        rsi_sell: f64,
        concurrency_limit: usize,
        deadline: Duration,
    ) -> Result<BatchResult, ServiceError> {
        if symbols.is_empty() {
            return Err(ValidationError::EmptyList("symbols").into());
        }
        if timeframes.is_empty() {
            return Err(ValidationError::EmptyList("timeframes").into());
        }
        if concurrency_limit == 0 {
            return Err(ValidationError::ZeroConcurrency.into());
        }
        validate_limit(limit)?;
        let params = StrategyParams::new(rsi_buy, rsi_sell)?;

        let config = BatchConfig {
            symbols: symbols.iter().map(|s| normalize_symbol(s)).collect(),
            timeframes: timeframes.to_vec(),
            limit,
            params,
            concurrency_limit,
            deadline_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        };

        let specs: Vec<RunSpec> = config
            .symbols
            .iter()
            .flat_map(|symbol| {
                config.timeframes.iter().map(move |&timeframe| RunSpec {
                    symbol: symbol.clone(),
                    timeframe,
                    limit,
                    params,
                })
            })
            .collect();

        info!(
            "Starting batch of {} backtests ({} symbols x {} timeframes), concurrency {}",
            specs.len(),
            config.symbols.len(),
            config.timeframes.len(),
            concurrency_limit
        );

        let started = Instant::now();
        let results = self.execute(&specs, concurrency_limit, deadline).await;
        let total_execution_time = started.elapsed().as_secs_f64();

        let result = self.summarize(config, results, total_execution_time);
        info!(
            "Batch finished in {:.2}s: {} successful, {} failed ({} timed out)",
            total_execution_time,
            result.summary.successful,
            result.summary.failed,
            result.summary.timed_out
        );
        Ok(result)
    }

    /// Fetch one series and backtest every pair of the threshold grid on it.
    pub async fn run_optimize(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        grid: &OptimizeGrid,
    ) -> Result<OptimizeResult, ServiceError> {
        validate_limit(limit)?;
        let pairs = grid.pairs()?;
        let symbol = normalize_symbol(symbol);

        let started = Instant::now();
        let candles = self
            .source
            .fetch_candles(&symbol, timeframe, limit)
            .await
            .map_err(BacktestError::from)?;
        info!(
            "Optimizing {} {} over {} threshold pairs on {} candles",
            symbol,
            timeframe,
            pairs.len(),
            candles.len()
        );

        let results: Vec<RunResult> = pairs
            .into_iter()
            .map(|params| match backtest_candles(&candles, timeframe, &params) {
                Ok(report) => RunResult::success(&symbol, timeframe, params, report.metrics),
                Err(e) => RunResult::failure(&symbol, timeframe, params, RunError::from(e)),
            })
            .collect();

        let best = rank_successes(&results).first().map(|r| (*r).clone());
        if let Some(best) = &best {
            info!(
                "Best thresholds for {} {}: buy {} sell {}",
                symbol,
                timeframe,
                best.params.rsi_buy(),
                best.params.rsi_sell()
            );
        }

        Ok(OptimizeResult {
            symbol,
            timeframe,
            limit,
            candles_used: candles.len(),
            results,
            best,
            total_execution_time: started.elapsed().as_secs_f64(),
        })
    }

    /// Current RSI and EMA trend for one symbol over its latest `limit` candles.
    pub async fn snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<IndicatorSnapshot, ServiceError> {
        if !(SNAPSHOT_LIMIT_MIN..=LIMIT_MAX).contains(&limit) {
            return Err(ValidationError::LimitOutOfRange {
                value: limit,
                min: SNAPSHOT_LIMIT_MIN,
                max: LIMIT_MAX,
            }
            .into());
        }
        let symbol = normalize_symbol(symbol);

        let candles = self
            .source
            .fetch_candles(&symbol, timeframe, limit)
            .await
            .map_err(BacktestError::from)?;
        validate_series(&candles)?;
        let frame = IndicatorEngine::new().compute(&candles)?;

        let Some((index, point)) = frame.latest() else {
            return Err(BacktestError::InsufficientData {
                required: MIN_CANDLES,
                actual: candles.len(),
            }
            .into());
        };
        debug!("Snapshot for {} {} at candle {}", symbol, timeframe, index);

        Ok(IndicatorSnapshot {
            symbol,
            timeframe,
            current_candle: candles[index].clone(),
            rsi: point.rsi,
            ema_fast: point.fast_ema,
            ema_slow: point.slow_ema,
            direction: point.direction,
            candles_used: candles.len(),
        })
    }

    /// Run all specs, returning one result per spec in the same order.
    async fn execute(
        &self,
        specs: &[RunSpec],
        concurrency_limit: usize,
        deadline: Duration,
    ) -> Vec<RunResult> {
        // A deadline past the clock's range means no deadline.
        let deadline_at = time::Instant::now().checked_add(deadline);
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let mut tasks = JoinSet::new();
        let mut slot_of: HashMap<task::Id, usize> = HashMap::with_capacity(specs.len());

        for (index, spec) in specs.iter().cloned().enumerate() {
            let runner = self.runner.clone();
            let semaphore = Arc::clone(&semaphore);

            let handle = tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                debug!("Running backtest for {} {}", spec.symbol, spec.timeframe);
                runner.run(&spec).await
            });
            slot_of.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<RunResult>> = vec![None; specs.len()];
        loop {
            let joined = match deadline_at {
                Some(at) => timeout_at(at, tasks.join_next_with_id()).await,
                None => Ok(tasks.join_next_with_id().await),
            };

            match joined {
                Ok(Some(Ok((id, result)))) => {
                    if let Some(&index) = slot_of.get(&id) {
                        slots[index] = Some(result);
                    }
                }
                Ok(Some(Err(e))) => {
                    let Some(&index) = slot_of.get(&e.id()) else {
                        error!("Backtest task failed: {}", e);
                        continue;
                    };
                    let spec = &specs[index];
                    error!("Backtest task for {} {} failed: {}", spec.symbol, spec.timeframe, e);
                    slots[index] = Some(RunResult::failure(
                        &spec.symbol,
                        spec.timeframe,
                        spec.params,
                        RunError::internal(format!("task failed: {}", e)),
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch deadline of {:?} reached with {} runs outstanding",
                        deadline,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(specs)
            .map(|(slot, spec)| {
                slot.unwrap_or_else(|| {
                    RunResult::failure(
                        &spec.symbol,
                        spec.timeframe,
                        spec.params,
                        RunError::timeout(format!(
                            "{} {} did not finish within {:?}",
                            spec.symbol, spec.timeframe, deadline
                        )),
                    )
                })
            })
            .collect()
    }

    fn summarize(
        &self,
        config: BatchConfig,
        results: Vec<RunResult>,
        total_execution_time: f64,
    ) -> BatchResult {
        let successful = results.iter().filter(|r| r.is_success()).count();
        let timed_out = results
            .iter()
            .filter(|r| {
                r.error
                    .as_ref()
                    .map_or(false, |e| e.kind == RunErrorKind::Timeout)
            })
            .count();
        let forced_close_trades: usize = results
            .iter()
            .filter_map(|r| r.metrics.as_ref())
            .map(|m| m.forced_close_trades)
            .sum();

        let best_performers = rank_successes(&results)
            .into_iter()
            .take(self.top_k)
            .filter_map(BestPerformer::from_run)
            .collect();

        let summary = BatchSummary {
            total_tests: results.len(),
            successful,
            failed: results.len() - successful,
            timed_out,
            forced_close_trades,
            best_performers,
        };

        BatchResult {
            config,
            aggregate_stats: aggregate_stats(&results),
            results,
            summary,
            total_execution_time,
        }
    }
}

use backtest_core::backtest::{
    backtest_candles, simulate, Candle, IndicatorEngine, MetricsCalculator, SignalGenerator,
    StrategyParams, Timeframe,
};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// 生成带趋势和周期波动的合成 K 线
fn create_test_candles(len: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..len)
        .map(|i| {
            let t = i as f64;
            let close = 30000.0 + 900.0 * (t / 11.0).sin() + 400.0 * (t / 37.0).cos() + 2.0 * t;
            Candle::new(
                start + Duration::hours(4 * i as i64),
                close,
                close * 1.002,
                close * 0.998,
                close,
                10.0,
            )
        })
        .collect()
}

fn bench_indicators(c: &mut Criterion) {
    let engine = IndicatorEngine::new();
    let mut group = c.benchmark_group("indicators");

    for size in [500, 1000, 5000].iter() {
        let candles = create_test_candles(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &candles, |b, candles| {
            b.iter(|| black_box(engine.compute(black_box(candles)).unwrap()));
        });
    }
    group.finish();
}

fn bench_simulation(c: &mut Criterion) {
    let candles = create_test_candles(5000);
    let frame = IndicatorEngine::new().compute(&candles).unwrap();
    let params = StrategyParams::new(60.0, 70.0).unwrap();

    c.bench_function("simulate_5000", |b| {
        b.iter(|| black_box(simulate(&candles, SignalGenerator::new(&frame, &params))));
    });

    let simulation = simulate(&candles, SignalGenerator::new(&frame, &params));
    let execution = backtest_candles(&candles, Timeframe::H4, &params)
        .unwrap()
        .metrics
        .execution;
    let calculator = MetricsCalculator::new(Timeframe::H4);

    c.bench_function("metrics_5000", |b| {
        b.iter(|| {
            black_box(calculator.calculate(
                &simulation.trades,
                &simulation.equity_curve,
                execution.clone(),
            ))
        });
    });
}

fn bench_full_backtest(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_backtest");
    group.sample_size(50); // 完整流程较慢，减少采样

    let params = StrategyParams::new(60.0, 70.0).unwrap();
    for size in [500, 5000].iter() {
        let candles = create_test_candles(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &candles, |b, candles| {
            b.iter(|| black_box(backtest_candles(candles, Timeframe::H4, &params).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_indicators, bench_simulation, bench_full_backtest);
criterion_main!(benches);

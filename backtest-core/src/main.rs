use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backtest_core::{
    backtest::Timeframe,
    config::Settings,
    exchange::BinanceExchange,
    service::{BacktestService, OptimizeGrid},
};

#[derive(Parser)]
#[command(name = "backtest")]
#[command(about = "RSI + trend strategy backtester for Binance spot candles")]
enum Commands {
    /// Backtest one symbol on one timeframe
    Single {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(short, long, default_value = "4h")]
        timeframe: Timeframe,
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(long)]
        rsi_buy: Option<f64>,
        #[arg(long)]
        rsi_sell: Option<f64>,
    },
    /// Backtest every symbol x timeframe combination
    Batch {
        #[arg(short, long, value_delimiter = ',', default_value = "BTCUSDT,ETHUSDT")]
        symbols: Vec<String>,
        #[arg(short, long, value_delimiter = ',', default_value = "4h,1d")]
        timeframes: Vec<Timeframe>,
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(long)]
        rsi_buy: Option<f64>,
        #[arg(long)]
        rsi_sell: Option<f64>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Search the RSI threshold grid on one series
    Optimize {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(short, long, default_value = "4h")]
        timeframe: Timeframe,
        #[arg(short, long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 30.0)]
        buy_min: f64,
        #[arg(long, default_value_t = 65.0)]
        buy_max: f64,
        #[arg(long, default_value_t = 65.0)]
        sell_min: f64,
        #[arg(long, default_value_t = 80.0)]
        sell_max: f64,
        #[arg(long, default_value_t = 5.0)]
        step: f64,
    },
    /// Latest RSI and EMA trend readings, no backtest
    Stats {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(short, long, default_value = "4h")]
        timeframe: Timeframe,
        #[arg(short, long, default_value_t = 500)]
        limit: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::new().context("Failed to load configuration")?;
    let exchange = BinanceExchange::from_settings(&settings.exchange);
    info!("Using market data from {}", exchange.api_url());

    let service = BacktestService::new(Arc::new(exchange)).with_top_k(settings.batch.top_k);
    let strategy = &settings.strategy;

    match Commands::parse() {
        Commands::Single {
            symbol,
            timeframe,
            limit,
            rsi_buy,
            rsi_sell,
        } => {
            let result = service
                .run_single(
                    &symbol,
                    timeframe,
                    limit.unwrap_or(strategy.limit),
                    rsi_buy.unwrap_or(strategy.rsi_buy),
                    rsi_sell.unwrap_or(strategy.rsi_sell),
                )
                .await?;
            print_json(&result)?;
        }

        Commands::Batch {
            symbols,
            timeframes,
            limit,
            rsi_buy,
            rsi_sell,
            concurrency,
            deadline_secs,
        } => {
            let deadline = deadline_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.batch.deadline());

            let result = service
                .run_batch(
                    &symbols,
                    &timeframes,
                    limit.unwrap_or(strategy.limit),
                    rsi_buy.unwrap_or(strategy.rsi_buy),
                    rsi_sell.unwrap_or(strategy.rsi_sell),
                    concurrency.unwrap_or(settings.batch.concurrency_limit),
                    deadline,
                )
                .await?;
            print_json(&result)?;
        }

        Commands::Optimize {
            symbol,
            timeframe,
            limit,
            buy_min,
            buy_max,
            sell_min,
            sell_max,
            step,
        } => {
            let grid = OptimizeGrid {
                buy_min,
                buy_max,
                sell_min,
                sell_max,
                step,
            };
            let result = service
                .run_optimize(&symbol, timeframe, limit.unwrap_or(strategy.limit), &grid)
                .await?;
            print_json(&result)?;
        }

        Commands::Stats {
            symbol,
            timeframe,
            limit,
        } => {
            let snapshot = service.snapshot(&symbol, timeframe, limit).await?;
            print_json(&snapshot)?;
        }
    }

    Ok(())
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::backtest::{StrategyParams, ValidationError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub api_url: String,
    pub testnet: bool,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.binance.com".to_string(),
            testnet: false,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub concurrency_limit: usize,
    pub deadline_secs: u64,
    /// Length of the best performers list
    pub top_k: usize,
}

impl BatchSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            deadline_secs: 120,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub rsi_buy: f64,
    pub rsi_sell: f64,
    pub limit: u32,
}

impl StrategySettings {
    pub fn params(&self) -> Result<StrategyParams, ValidationError> {
        StrategyParams::new(self.rsi_buy, self.rsi_sell)
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            rsi_buy: 60.0,
            rsi_sell: 70.0,
            limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub batch: BatchSettings,
    pub strategy: StrategySettings,
}

impl Settings {
    /// Layers `config/default`, `config/{RUN_MODE}` and `BACKTEST__*` variables.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("BACKTEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

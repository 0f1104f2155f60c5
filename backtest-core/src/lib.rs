pub mod backtest;
pub mod config;
pub mod exchange;
pub mod service;

//! ticklab runner: backtest orchestration, optimizer, price loading, scheduling.
//!
//! This crate builds on `ticklab-core` to provide:
//! - Trading configuration files (`[[configuration]]` TOML tables)
//! - Price loading from CSV, a price-history store, or a seeded random walk
//! - Single-backtest runner with trade statistics
//! - Grid-search parameter optimizer with four independent rankings
//! - The tick scheduler that isolates per-configuration failures
//! - Paper replay of recorded prices through the live coordinator
//! - JSON/CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod optimizer;
pub mod replay;
pub mod runner;
pub mod scheduler;

pub use config::{load_configurations, parse_configurations, ConfigError};
pub use data_loader::{
    load_csv, load_csv_all, load_history, read_csv, read_csv_all, synthetic_walk, LoadError,
};
pub use metrics::TradeStats;
pub use optimizer::{
    optimize, OptimizeError, OptimizerSettings, ParamGrid, ParamKey, RankingMetric, Rankings,
};
pub use replay::{replay_paper, ConfigSummary, ReplayError, ReplayReport};
pub use runner::{run_backtest, BacktestResult, RunError};
pub use scheduler::{TickOutcome, TickScheduler};

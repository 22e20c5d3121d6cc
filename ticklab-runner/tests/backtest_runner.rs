//! Integration tests for the runner: CSV in, backtest, artifacts out.
//!
//! Tests:
//! 1. Every strategy family runs end to end over a CSV price export
//! 2. Result statistics agree with the trade tape
//! 3. Artifacts round-trip through a temporary directory
//! 4. The trade CSV has one row per trade plus a header

use chrono::{Duration, TimeZone, Utc};
use std::io::Write;

use ticklab_core::config::TradingConfiguration;
use ticklab_core::domain::PriceSeries;
use ticklab_core::engine::SimulationSettings;
use ticklab_core::strategy::StrategyParameters;
use ticklab_runner::data_loader::load_csv;
use ticklab_runner::export::{export_trades_csv, load_artifacts, save_artifacts};
use ticklab_runner::runner::{run_backtest, BacktestResult};

// ── Helpers ──────────────────────────────────────────────────────────

fn swing_prices(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 * (1.0 + 0.05 * (x / 15.0).sin() + 0.01 * (x * 1.3).sin())
        })
        .collect()
}

/// Price export with a second symbol mixed in, rows out of order.
fn write_price_csv(dir: &std::path::Path, prices: &[f64]) -> std::path::PathBuf {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let path = dir.join("prices.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "id,symbol,price,recorded_at").unwrap();
    for (i, p) in prices.iter().enumerate().rev() {
        let at = (start + Duration::minutes(i as i64)).format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{},BTC/JPY,{p},{at}", i * 2).unwrap();
        writeln!(file, "{},ETH/JPY,{},{at}", i * 2 + 1, p / 20.0).unwrap();
    }
    path
}

fn config(strategy: &str) -> TradingConfiguration {
    TradingConfiguration::new(strategy, "BTC/JPY", strategy, StrategyParameters::default())
}

fn check_consistency(result: &BacktestResult) {
    assert_eq!(result.total_trades, result.trades.len());
    assert_eq!(result.total_trades, result.winning_trades + result.losing_trades);

    let nets: Vec<f64> = result
        .trades
        .iter()
        .map(|p| p.net_profit_loss().unwrap())
        .collect();
    let total: f64 = nets.iter().sum();
    assert!((result.total_pnl - total).abs() < 1e-9);
    assert_eq!(
        result.winning_trades,
        nets.iter().filter(|n| **n > 0.0).count()
    );
    assert!((result.total_win - result.total_loss - total).abs() < 1e-9);
    assert!(result.max_drawdown >= 0.0);
}

// ── 1-2. End to end ──────────────────────────────────────────────────

#[test]
fn every_family_runs_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_price_csv(dir.path(), &swing_prices(400));
    let series = load_csv(&path, "BTC/JPY").unwrap();
    assert_eq!(series.len(), 400);
    assert!(series.timestamps().windows(2).all(|w| w[0] < w[1]));

    for strategy in ["breakout", "rsi_contrarian", "ma_cross"] {
        let result = run_backtest(&config(strategy), &series, SimulationSettings::default())
            .unwrap_or_else(|e| panic!("{strategy}: {e}"));
        assert_eq!(result.ticks, 400);
        check_consistency(&result);
    }
}

#[test]
fn breakout_trades_on_swings() {
    let mut series = PriceSeries::new("BTC/JPY");
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for (i, p) in swing_prices(400).into_iter().enumerate() {
        series.push(p, start + Duration::minutes(i as i64)).unwrap();
    }
    let result = run_backtest(&config("breakout"), &series, SimulationSettings::default()).unwrap();
    assert!(result.total_trades > 0);
    assert!(result
        .trades
        .iter()
        .all(|p| p.entry_fee > 0.0 && p.exit_fee.unwrap() > 0.0));
}

// ── 3. Artifacts ─────────────────────────────────────────────────────

#[test]
fn artifacts_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_price_csv(dir.path(), &swing_prices(300));
    let series = load_csv(&path, "BTC/JPY").unwrap();
    let result = run_backtest(&config("breakout"), &series, SimulationSettings::default()).unwrap();

    let run_dir = save_artifacts(&result, &dir.path().join("out")).unwrap();
    assert!(run_dir.ends_with(&result.run_id));
    assert!(run_dir.join("trades.csv").exists());

    let loaded = load_artifacts(&run_dir).unwrap();
    assert_eq!(loaded.run_id, result.run_id);
    assert_eq!(loaded.parameters.lookback_period, result.parameters.lookback_period);
    let ids = |r: &BacktestResult| r.trades.iter().map(|p| p.id).collect::<Vec<_>>();
    assert_eq!(ids(&loaded), ids(&result));
    assert_eq!(loaded.total_trades, result.total_trades);
}

// ── 4. Trade CSV ─────────────────────────────────────────────────────

#[test]
fn trade_csv_has_row_per_trade() {
    let prices = swing_prices(300);
    let mut series = PriceSeries::new("BTC/JPY");
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for (i, p) in prices.into_iter().enumerate() {
        series.push(p, start + Duration::minutes(i as i64)).unwrap();
    }
    let result = run_backtest(&config("breakout"), &series, SimulationSettings::default()).unwrap();

    let csv = export_trades_csv(&result.trades).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), result.trades.len() + 1);
    assert!(lines[0].starts_with("id,symbol,side"));
    if let Some(first) = lines.get(1) {
        assert!(first.contains("BTC/JPY"));
    }
}

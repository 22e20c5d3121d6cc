//! Backtest runner: wires a configuration, a series and the simulator
//! together and turns the raw run into a `BacktestResult`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ticklab_core::config::TradingConfiguration;
use ticklab_core::domain::{Position, PositionError, PriceSeries};
use ticklab_core::engine::{BacktestSimulator, SimulationSettings};
use ticklab_core::strategy::{build_strategy, StrategyError, StrategyParameters};

use crate::metrics::TradeStats;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("simulation failed: {0}")]
    Position(#[from] PositionError),

    #[error("series is for '{series}' but the configuration trades '{config}'")]
    SymbolMismatch { series: String, config: String },
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Fingerprint of strategy, symbol and parameters.
    pub run_id: String,
    pub strategy: String,
    pub symbol: String,
    pub parameters: StrategyParameters,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub total_win: f64,
    pub total_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub rejected_entries: usize,
    pub ticks: usize,
    pub trades: Vec<Position>,
}

impl BacktestResult {
    pub fn stats(&self) -> TradeStats {
        TradeStats {
            total_trades: self.total_trades,
            winning_trades: self.winning_trades,
            losing_trades: self.losing_trades,
            win_rate: self.win_rate,
            total_pnl: self.total_pnl,
            average_pnl: self.average_pnl,
            total_win: self.total_win,
            total_loss: self.total_loss,
            profit_factor: self.profit_factor,
        }
    }
}

/// Run one configuration over `series`.
///
/// `settings.config_id` is replaced by the configuration's id so the
/// simulated positions carry the right owner.
pub fn run_backtest(
    config: &TradingConfiguration,
    series: &PriceSeries,
    settings: SimulationSettings,
) -> Result<BacktestResult, RunError> {
    if series.symbol() != config.symbol {
        return Err(RunError::SymbolMismatch {
            series: series.symbol().to_string(),
            config: config.symbol.clone(),
        });
    }

    let strategy = build_strategy(&config.strategy, &config.parameters)?;
    let settings = SimulationSettings {
        config_id: config.id.clone(),
        ..settings
    };
    let run = BacktestSimulator::new(strategy.as_ref(), &config.parameters, settings).run(series)?;
    let stats = TradeStats::compute(&run.trades);

    debug!(
        strategy = %config.strategy,
        trades = stats.total_trades,
        total_pnl = stats.total_pnl,
        max_drawdown = run.max_drawdown,
        "backtest finished"
    );

    Ok(BacktestResult {
        run_id: config.fingerprint(),
        strategy: config.strategy.clone(),
        symbol: config.symbol.clone(),
        parameters: config.parameters.clone(),
        total_trades: stats.total_trades,
        winning_trades: stats.winning_trades,
        losing_trades: stats.losing_trades,
        win_rate: stats.win_rate,
        total_pnl: stats.total_pnl,
        average_pnl: stats.average_pnl,
        total_win: stats.total_win,
        total_loss: stats.total_loss,
        profit_factor: stats.profit_factor,
        max_drawdown: run.max_drawdown,
        rejected_entries: run.rejected_entries,
        ticks: run.ticks,
        trades: run.trades,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ticklab_core::domain::CloseReason;

    fn series(prices: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut s = PriceSeries::new("BTC/JPY");
        for (i, &p) in prices.iter().enumerate() {
            s.push(p, start + Duration::minutes(i as i64)).unwrap();
        }
        s
    }

    fn breakout(lookback: usize) -> TradingConfiguration {
        let params = StrategyParameters {
            lookback_period: lookback,
            breakout_threshold: 1.0,
            trade_size: 1.0,
            ..StrategyParameters::default()
        };
        TradingConfiguration::new("brk", "BTC/JPY", "breakout", params)
    }

    #[test]
    fn result_carries_identity_and_stats() {
        let config = breakout(3);
        // breakout at 105, then a slide through the stop
        let s = series(&[100.0, 100.0, 100.0, 105.0, 104.0, 103.0, 102.0]);
        let result = run_backtest(&config, &s, SimulationSettings::default()).unwrap();

        assert_eq!(result.run_id, config.fingerprint());
        assert_eq!(result.strategy, "breakout");
        assert_eq!(result.symbol, "BTC/JPY");
        assert_eq!(result.ticks, 7);
        assert_eq!(result.total_trades, result.trades.len());
        assert_eq!(
            result.total_trades,
            result.winning_trades + result.losing_trades
        );
        assert!(result.trades.iter().all(|p| p.config_id == config.id));
        assert!(result.trades.iter().all(|p| !p.is_open()));
    }

    #[test]
    fn leftovers_close_at_end_of_data() {
        let config = breakout(3);
        let s = series(&[100.0, 100.0, 100.0, 105.0, 105.2]);
        let result = run_backtest(&config, &s, SimulationSettings::default()).unwrap();

        let last = result.trades.last().unwrap();
        assert_eq!(last.close_reason, Some(CloseReason::EndOfData));
        assert_eq!(last.exit_price, Some(105.2));
    }

    #[test]
    fn no_signal_means_no_trades() {
        let config = breakout(3);
        let s = series(&[100.0; 10]);
        let result = run_backtest(&config, &s, SimulationSettings::default()).unwrap();
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.profit_factor, 0.0);
        assert_eq!(result.max_drawdown, 0.0);
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let config = TradingConfiguration::new(
            "x",
            "BTC/JPY",
            "grid",
            StrategyParameters::default(),
        );
        let s = series(&[100.0; 5]);
        assert!(matches!(
            run_backtest(&config, &s, SimulationSettings::default()),
            Err(RunError::Strategy(_))
        ));
    }

    #[test]
    fn symbol_mismatch_is_an_error() {
        let config = TradingConfiguration::new(
            "x",
            "ETH/JPY",
            "breakout",
            StrategyParameters::default(),
        );
        let s = series(&[100.0; 5]);
        assert!(matches!(
            run_backtest(&config, &s, SimulationSettings::default()),
            Err(RunError::SymbolMismatch { .. })
        ));
    }
}

//! Parameter optimizer: exhaustive grid search over strategy parameters.
//!
//! Every grid point is backtested over the same series. Points with fewer
//! than `min_trades` trades are discarded as statistically unreliable, and
//! the survivors are ranked four ways independently. The rankings are never
//! folded into one score.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

use ticklab_core::config::TradingConfiguration;
use ticklab_core::domain::PriceSeries;
use ticklab_core::engine::SimulationSettings;
use ticklab_core::strategy::{StrategyFamily, StrategyParameters};

use crate::metrics::risk_adjusted_return;
use crate::runner::{run_backtest, BacktestResult, RunError};

/// Fewest samples an optimization run accepts.
pub const MIN_OPTIMIZE_PRICES: usize = 100;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("need at least {need} prices to optimize, have {have}")]
    InsufficientData { have: usize, need: usize },

    #[error(transparent)]
    Run(#[from] RunError),
}

// ─── Grid ───────────────────────────────────────────────────────────

/// A tunable field of `StrategyParameters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    BreakoutThreshold,
    LookbackPeriod,
    StopLossPercent,
    InitialTrailingStopPercent,
    TrailingStopOffsetPercent,
    MaxPositions,
    RsiPeriod,
    RsiOversold,
    RsiOverbought,
    RsiExitLong,
    RsiExitShort,
    MaxHoldMinutes,
    ShortPeriod,
    LongPeriod,
}

impl ParamKey {
    /// Write `value` into the matching field. Integer fields are rounded.
    pub fn apply(self, params: &mut StrategyParameters, value: f64) {
        let whole = value.round().max(0.0);
        match self {
            ParamKey::BreakoutThreshold => params.breakout_threshold = value,
            ParamKey::LookbackPeriod => params.lookback_period = whole as usize,
            ParamKey::StopLossPercent => params.stop_loss_percent = value,
            ParamKey::InitialTrailingStopPercent => params.initial_trailing_stop_percent = value,
            ParamKey::TrailingStopOffsetPercent => params.trailing_stop_offset_percent = value,
            ParamKey::MaxPositions => params.max_positions = whole as usize,
            ParamKey::RsiPeriod => params.rsi_period = whole as usize,
            ParamKey::RsiOversold => params.rsi_oversold = value,
            ParamKey::RsiOverbought => params.rsi_overbought = value,
            ParamKey::RsiExitLong => params.rsi_exit_long = value,
            ParamKey::RsiExitShort => params.rsi_exit_short = value,
            ParamKey::MaxHoldMinutes => params.max_hold_minutes = whole as i64,
            ParamKey::ShortPeriod => params.short_period = whole as usize,
            ParamKey::LongPeriod => params.long_period = whole as usize,
        }
    }

    pub fn read(self, params: &StrategyParameters) -> f64 {
        match self {
            ParamKey::BreakoutThreshold => params.breakout_threshold,
            ParamKey::LookbackPeriod => params.lookback_period as f64,
            ParamKey::StopLossPercent => params.stop_loss_percent,
            ParamKey::InitialTrailingStopPercent => params.initial_trailing_stop_percent,
            ParamKey::TrailingStopOffsetPercent => params.trailing_stop_offset_percent,
            ParamKey::MaxPositions => params.max_positions as f64,
            ParamKey::RsiPeriod => params.rsi_period as f64,
            ParamKey::RsiOversold => params.rsi_oversold,
            ParamKey::RsiOverbought => params.rsi_overbought,
            ParamKey::RsiExitLong => params.rsi_exit_long,
            ParamKey::RsiExitShort => params.rsi_exit_short,
            ParamKey::MaxHoldMinutes => params.max_hold_minutes as f64,
            ParamKey::ShortPeriod => params.short_period as f64,
            ParamKey::LongPeriod => params.long_period as f64,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ParamKey::BreakoutThreshold => "threshold%",
            ParamKey::LookbackPeriod => "lookback",
            ParamKey::StopLossPercent => "stop%",
            ParamKey::InitialTrailingStopPercent => "trail0%",
            ParamKey::TrailingStopOffsetPercent => "offset%",
            ParamKey::MaxPositions => "max_pos",
            ParamKey::RsiPeriod => "rsi",
            ParamKey::RsiOversold => "oversold",
            ParamKey::RsiOverbought => "overbought",
            ParamKey::RsiExitLong => "exit_long",
            ParamKey::RsiExitShort => "exit_short",
            ParamKey::MaxHoldMinutes => "max_hold",
            ParamKey::ShortPeriod => "short",
            ParamKey::LongPeriod => "long",
        }
    }
}

/// Cartesian product of parameter axes over a base parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub axes: Vec<(ParamKey, Vec<f64>)>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, key: ParamKey, values: impl Into<Vec<f64>>) -> Self {
        self.axes.push((key, values.into()));
        self
    }

    /// Default search space for a strategy family.
    pub fn for_family(family: StrategyFamily) -> Self {
        use ParamKey::*;
        match family {
            StrategyFamily::Breakout => Self::new()
                .axis(BreakoutThreshold, [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.8, 1.0])
                .axis(LookbackPeriod, [10.0, 15.0, 20.0, 30.0, 40.0, 60.0])
                .axis(StopLossPercent, [0.5, 1.0, 1.5, 2.0])
                .axis(InitialTrailingStopPercent, [0.3, 0.5, 0.7, 1.0])
                .axis(TrailingStopOffsetPercent, [0.3, 0.5, 0.7, 1.0])
                .axis(MaxPositions, [1.0, 2.0, 3.0]),
            StrategyFamily::RsiContrarian => Self::new()
                .axis(RsiPeriod, [14.0, 20.0, 30.0, 40.0, 60.0])
                .axis(RsiOversold, [20.0, 25.0, 30.0, 35.0])
                .axis(RsiOverbought, [65.0, 70.0, 75.0, 80.0])
                .axis(RsiExitLong, [45.0, 50.0, 55.0, 60.0])
                .axis(RsiExitShort, [40.0, 45.0, 50.0, 55.0])
                .axis(MaxHoldMinutes, [30.0, 60.0, 120.0])
                .axis(StopLossPercent, [0.5, 1.0, 1.5]),
            StrategyFamily::MaCross => Self::new()
                .axis(ShortPeriod, [3.0, 5.0, 7.0, 10.0])
                .axis(LongPeriod, [15.0, 20.0, 25.0, 30.0, 40.0])
                .axis(StopLossPercent, [0.5, 1.0, 1.5, 2.0]),
        }
    }

    /// Number of raw grid points, before invalid combinations are skipped.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    /// Expand into concrete parameter sets, first axis outermost.
    ///
    /// Moving-average combinations with `short >= long` are skipped.
    pub fn expand(&self, base: &StrategyParameters) -> Vec<StrategyParameters> {
        if self.axes.is_empty() {
            return Vec::new();
        }

        let mut points = vec![base.clone()];
        for (key, values) in &self.axes {
            points = points
                .iter()
                .flat_map(|point| {
                    values.iter().map(move |&value| {
                        let mut next = point.clone();
                        key.apply(&mut next, value);
                        next
                    })
                })
                .collect();
        }

        let constrains_ma = self
            .axes
            .iter()
            .any(|(k, _)| matches!(k, ParamKey::ShortPeriod | ParamKey::LongPeriod));
        if constrains_ma {
            points.retain(|p| p.short_period < p.long_period);
        }
        points
    }
}

// ─── Rankings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    TotalPnl,
    WinRate,
    ProfitFactor,
    /// Total PnL / |max drawdown|.
    RiskAdjusted,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 4] = [
        RankingMetric::TotalPnl,
        RankingMetric::WinRate,
        RankingMetric::ProfitFactor,
        RankingMetric::RiskAdjusted,
    ];

    pub fn score(self, result: &BacktestResult) -> f64 {
        match self {
            RankingMetric::TotalPnl => result.total_pnl,
            RankingMetric::WinRate => result.win_rate,
            RankingMetric::ProfitFactor => result.profit_factor,
            RankingMetric::RiskAdjusted => {
                risk_adjusted_return(result.total_pnl, result.max_drawdown)
            }
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankingMetric::TotalPnl => "Total P&L",
            RankingMetric::WinRate => "Win Rate",
            RankingMetric::ProfitFactor => "Profit Factor",
            RankingMetric::RiskAdjusted => "Risk-Adjusted Return (P&L / Max Drawdown)",
        })
    }
}

/// Optimizer output: four independent top-N lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rankings {
    /// Grid points backtested.
    pub evaluated: usize,
    /// Grid points that met the trade minimum.
    pub qualified: usize,
    pub by_total_pnl: Vec<BacktestResult>,
    pub by_win_rate: Vec<BacktestResult>,
    pub by_profit_factor: Vec<BacktestResult>,
    pub by_risk_adjusted: Vec<BacktestResult>,
}

impl Rankings {
    pub fn ranked(&self, metric: RankingMetric) -> &[BacktestResult] {
        match metric {
            RankingMetric::TotalPnl => &self.by_total_pnl,
            RankingMetric::WinRate => &self.by_win_rate,
            RankingMetric::ProfitFactor => &self.by_profit_factor,
            RankingMetric::RiskAdjusted => &self.by_risk_adjusted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.qualified == 0
    }
}

/// Best `top_n` results by `metric`, descending. Ties keep grid order.
pub fn rank(results: &[BacktestResult], metric: RankingMetric, top_n: usize) -> Vec<BacktestResult> {
    let mut sorted: Vec<&BacktestResult> = results.iter().collect();
    sorted.sort_by(|a, b| metric.score(b).total_cmp(&metric.score(a)));
    sorted.into_iter().take(top_n).cloned().collect()
}

// ─── Optimizer ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    /// Results with fewer trades are discarded.
    pub min_trades: usize,
    /// Length of each ranking.
    pub top_n: usize,
    /// Evaluate grid points on the rayon pool; sequential otherwise.
    pub parallel: bool,
    pub simulation: SimulationSettings,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            min_trades: 10,
            top_n: 10,
            parallel: true,
            simulation: SimulationSettings::default(),
        }
    }
}

/// Grid-search `grid` over `base`'s parameters.
pub fn optimize(
    base: &TradingConfiguration,
    series: &PriceSeries,
    grid: &ParamGrid,
    settings: &OptimizerSettings,
) -> Result<Rankings, OptimizeError> {
    if series.len() < MIN_OPTIMIZE_PRICES {
        return Err(OptimizeError::InsufficientData {
            have: series.len(),
            need: MIN_OPTIMIZE_PRICES,
        });
    }

    let points = grid.expand(&base.parameters);
    info!(
        strategy = %base.strategy,
        symbol = %base.symbol,
        combinations = points.len(),
        prices = series.len(),
        "optimizing"
    );

    let evaluate = |params: &StrategyParameters| -> Result<Option<BacktestResult>, RunError> {
        let config = TradingConfiguration {
            parameters: params.clone(),
            ..base.clone()
        };
        let result = run_backtest(&config, series, settings.simulation.clone())?;
        Ok((result.total_trades >= settings.min_trades).then_some(result))
    };

    let outcomes: Vec<Option<BacktestResult>> = if settings.parallel {
        points.par_iter().map(evaluate).collect::<Result<_, _>>()?
    } else {
        points.iter().map(evaluate).collect::<Result<_, _>>()?
    };
    let qualified: Vec<BacktestResult> = outcomes.into_iter().flatten().collect();

    info!(
        evaluated = points.len(),
        qualified = qualified.len(),
        min_trades = settings.min_trades,
        "optimization finished"
    );

    Ok(Rankings {
        evaluated: points.len(),
        qualified: qualified.len(),
        by_total_pnl: rank(&qualified, RankingMetric::TotalPnl, settings.top_n),
        by_win_rate: rank(&qualified, RankingMetric::WinRate, settings.top_n),
        by_profit_factor: rank(&qualified, RankingMetric::ProfitFactor, settings.top_n),
        by_risk_adjusted: rank(&qualified, RankingMetric::RiskAdjusted, settings.top_n),
    })
}

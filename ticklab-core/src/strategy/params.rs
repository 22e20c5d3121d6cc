//! Strategy parameter bag.
//!
//! One flat struct covers every strategy family; each strategy reads the knobs
//! it needs and ignores the rest. Every field has a default, so a TOML table
//! or CLI only has to name what it overrides.

use serde::{Deserialize, Serialize};

/// Numeric knobs for signal generation, stops and admission.
///
/// Percentages are expressed in percent (`0.5` means 0.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParameters {
    pub trade_size: f64,

    // Breakout
    pub lookback_period: usize,
    pub breakout_threshold: f64,

    // RSI contrarian
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_exit_long: f64,
    pub rsi_exit_short: f64,
    pub max_hold_minutes: i64,
    pub cooldown_minutes: i64,

    // Moving-average cross
    pub short_period: usize,
    pub long_period: usize,

    // Stops
    pub stop_loss_percent: f64,
    pub initial_trailing_stop_percent: f64,
    pub trailing_stop_offset_percent: f64,

    // Admission
    pub max_positions: usize,
    pub max_spread_percent: f64,

    /// Samples requested per market-data fetch.
    pub market_data_limit: usize,
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            trade_size: 0.01,
            lookback_period: 20,
            breakout_threshold: 0.1,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_exit_long: 50.0,
            rsi_exit_short: 50.0,
            max_hold_minutes: 60,
            cooldown_minutes: 30,
            short_period: 5,
            long_period: 20,
            stop_loss_percent: 1.0,
            initial_trailing_stop_percent: 0.7,
            trailing_stop_offset_percent: 0.5,
            max_positions: 3,
            max_spread_percent: 0.1,
            market_data_limit: 100,
        }
    }
}

impl StrategyParameters {
    /// Stable content hash of the parameter set (BLAKE3 over canonical JSON).
    pub fn fingerprint(&self) -> String {
        // serde_json::to_vec on a plain struct cannot fail
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }
}

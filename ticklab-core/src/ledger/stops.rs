//! Stop-price math shared by the live coordinator and the backtest.
//!
//! Three levels exist per position:
//! - initial trailing stop, set once at entry from the entry price
//! - trailing candidate, proposed every tick from the current price and
//!   accepted only if tighter (see `Position::ratchet_trailing`)
//! - fixed stop-loss, derived from the entry price and never moved

use serde::{Deserialize, Serialize};

use crate::domain::Side;
use crate::strategy::StrategyParameters;

/// Stop percentages for one configuration, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRules {
    pub stop_loss_percent: f64,
    pub initial_trailing_percent: f64,
    pub trailing_offset_percent: f64,
}

impl StopRules {
    pub fn from_params(params: &StrategyParameters) -> Self {
        Self {
            stop_loss_percent: params.stop_loss_percent,
            initial_trailing_percent: params.initial_trailing_stop_percent,
            trailing_offset_percent: params.trailing_stop_offset_percent,
        }
    }

    pub fn initial_trailing(&self, side: Side, entry_price: f64) -> f64 {
        away_from(side, entry_price, self.initial_trailing_percent)
    }

    pub fn trailing_candidate(&self, side: Side, price: f64) -> f64 {
        away_from(side, price, self.trailing_offset_percent)
    }

    pub fn fixed_stop(&self, side: Side, entry_price: f64) -> f64 {
        away_from(side, entry_price, self.stop_loss_percent)
    }
}

/// Whether `price` has reached `stop` against the position.
pub fn stop_breached(side: Side, price: f64, stop: f64) -> bool {
    match side {
        Side::Long => price <= stop,
        Side::Short => price >= stop,
    }
}

/// `price` moved `percent` against `side`: below for longs, above for shorts.
fn away_from(side: Side, price: f64, percent: f64) -> f64 {
    match side {
        Side::Long => price * (1.0 - percent / 100.0),
        Side::Short => price * (1.0 + percent / 100.0),
    }
}

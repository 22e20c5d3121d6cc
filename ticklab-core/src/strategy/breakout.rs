//! High/low breakout: enter when price clears the prior channel by a margin.
//!
//! Long when `current > high * (1 + t/100)`, short when
//! `current < low * (1 - t/100)`, where the channel covers the `lookback`
//! samples before the current one. Comparisons are strict.

use crate::domain::{PriceWindow, SignalAction, TradingSignal};
use crate::indicators::prior_channel;

use super::{SignalGenerator, StrategyFamily, StrategyParameters};

#[derive(Debug, Clone)]
pub struct Breakout {
    pub lookback: usize,
    /// Breakout margin in percent.
    pub threshold: f64,
    pub trade_size: f64,
}

impl Breakout {
    pub fn new(lookback: usize, threshold: f64, trade_size: f64) -> Self {
        Self {
            lookback,
            threshold,
            trade_size,
        }
    }

    pub fn from_params(params: &StrategyParameters) -> Self {
        Self::new(
            params.lookback_period,
            params.breakout_threshold,
            params.trade_size,
        )
    }

    pub fn upper_trigger(&self, high: f64) -> f64 {
        high * (1.0 + self.threshold / 100.0)
    }

    pub fn lower_trigger(&self, low: f64) -> f64 {
        low * (1.0 - self.threshold / 100.0)
    }
}

impl SignalGenerator for Breakout {
    fn name(&self) -> &str {
        "breakout"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::Breakout
    }

    fn warmup(&self) -> usize {
        self.lookback + 1
    }

    fn analyze(&self, window: &PriceWindow<'_>) -> TradingSignal {
        let (Some(current), Some((high, low))) =
            (window.current(), prior_channel(window.prices, self.lookback))
        else {
            return TradingSignal::hold_because("insufficient history");
        };

        let upper = self.upper_trigger(high);
        if current > upper {
            return TradingSignal::market(
                SignalAction::Buy,
                self.trade_size,
                format!("{current} broke above {}-tick high {high} (trigger {upper})", self.lookback),
            );
        }

        let lower = self.lower_trigger(low);
        if current < lower {
            return TradingSignal::market(
                SignalAction::Short,
                self.trade_size,
                format!("{current} broke below {}-tick low {low} (trigger {lower})", self.lookback),
            );
        }

        TradingSignal::hold()
    }
}

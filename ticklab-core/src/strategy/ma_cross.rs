//! Moving-average cross: golden cross buys, death cross sells.
//!
//! Fires only on the tick where the short SMA crosses the long SMA, comparing
//! against both averages one sample earlier. Needs `long_period + 1` samples.

use crate::domain::{PriceWindow, SignalAction, TradingSignal};
use crate::indicators::{sma, sma_before};

use super::{SignalGenerator, StrategyFamily, StrategyParameters};

#[derive(Debug, Clone)]
pub struct MaCross {
    pub short_period: usize,
    pub long_period: usize,
    pub trade_size: f64,
}

impl MaCross {
    pub fn from_params(params: &StrategyParameters) -> Self {
        Self {
            short_period: params.short_period,
            long_period: params.long_period,
            trade_size: params.trade_size,
        }
    }
}

impl SignalGenerator for MaCross {
    fn name(&self) -> &str {
        "ma_cross"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::MaCross
    }

    fn warmup(&self) -> usize {
        self.long_period + 1
    }

    fn analyze(&self, window: &PriceWindow<'_>) -> TradingSignal {
        let prices = window.prices;
        let averages = (
            sma(prices, self.short_period),
            sma(prices, self.long_period),
            sma_before(prices, self.short_period),
            sma_before(prices, self.long_period),
        );
        let (Some(short_now), Some(long_now), Some(short_prev), Some(long_prev)) = averages
        else {
            return TradingSignal::hold_because("insufficient history");
        };
        let Some(price) = window.current() else {
            return TradingSignal::hold();
        };

        // crosses are priced at the tick that produced them
        if short_prev <= long_prev && short_now > long_now {
            TradingSignal::limit(
                SignalAction::Buy,
                self.trade_size,
                price,
                format!("golden cross: SMA{} {short_now:.4} > SMA{} {long_now:.4}", self.short_period, self.long_period),
            )
        } else if short_prev >= long_prev && short_now < long_now {
            TradingSignal::limit(
                SignalAction::Sell,
                self.trade_size,
                price,
                format!("death cross: SMA{} {short_now:.4} < SMA{} {long_now:.4}", self.short_period, self.long_period),
            )
        } else {
            TradingSignal::hold()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::make_series;

    fn cross(short_period: usize, long_period: usize) -> MaCross {
        MaCross {
            short_period,
            long_period,
            trade_size: 1.0,
        }
    }

    #[test]
    fn golden_cross_buys_once() {
        // flat, then a jump lifts SMA2 above SMA3
        let series = make_series(&[10.0, 10.0, 10.0, 10.0, 13.0]);
        let strategy = cross(2, 3);
        let signal = strategy.analyze(&series.full_window());
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.price, Some(13.0));

        // one tick later the averages are still crossed, so no repeat signal
        let series = make_series(&[10.0, 10.0, 10.0, 10.0, 13.0, 14.0]);
        assert!(strategy.analyze(&series.full_window()).is_hold());
    }

    #[test]
    fn death_cross_sells() {
        let series = make_series(&[10.0, 10.0, 10.0, 10.0, 7.0]);
        let signal = cross(2, 3).analyze(&series.full_window());
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.price, Some(7.0));
    }

    #[test]
    fn needs_long_period_plus_one() {
        let series = make_series(&[10.0, 10.0, 13.0]);
        assert!(cross(2, 3).analyze(&series.full_window()).is_hold());
    }
}

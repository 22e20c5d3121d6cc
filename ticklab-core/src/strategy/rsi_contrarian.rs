//! RSI contrarian: buy oversold, short overbought, take profit on mean reversion.
//!
//! The RSI is recomputed from the window on every call, so the entry check
//! and the exit check always agree on the value for a given tick.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{CloseReason, Position, PriceWindow, Side, SignalAction, TradingSignal};
use crate::indicators::rsi;

use super::{SignalGenerator, StrategyFamily, StrategyParameters};

#[derive(Debug, Clone)]
pub struct RsiContrarian {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub exit_long: f64,
    pub exit_short: f64,
    pub max_hold_minutes: i64,
    pub cooldown_minutes: i64,
    pub trade_size: f64,
}

impl RsiContrarian {
    pub fn from_params(params: &StrategyParameters) -> Self {
        Self {
            period: params.rsi_period,
            oversold: params.rsi_oversold,
            overbought: params.rsi_overbought,
            exit_long: params.rsi_exit_long,
            exit_short: params.rsi_exit_short,
            max_hold_minutes: params.max_hold_minutes,
            cooldown_minutes: params.cooldown_minutes,
            trade_size: params.trade_size,
        }
    }
}

impl SignalGenerator for RsiContrarian {
    fn name(&self) -> &str {
        "rsi_contrarian"
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::RsiContrarian
    }

    fn warmup(&self) -> usize {
        self.period + 1
    }

    fn analyze(&self, window: &PriceWindow<'_>) -> TradingSignal {
        let Some(value) = rsi(window.prices, self.period) else {
            return TradingSignal::hold_because("insufficient history");
        };

        if value < self.oversold {
            TradingSignal::market(
                SignalAction::Buy,
                self.trade_size,
                format!("RSI {value:.2} < oversold {}", self.oversold),
            )
        } else if value > self.overbought {
            TradingSignal::market(
                SignalAction::Short,
                self.trade_size,
                format!("RSI {value:.2} > overbought {}", self.overbought),
            )
        } else {
            TradingSignal::hold()
        }
    }

    fn exit_signal(
        &self,
        position: &Position,
        window: &PriceWindow<'_>,
        now: DateTime<Utc>,
    ) -> Option<CloseReason> {
        if let Some(value) = rsi(window.prices, self.period) {
            let take_profit = match position.side {
                Side::Long => value > self.exit_long,
                Side::Short => value < self.exit_short,
            };
            if take_profit {
                return Some(CloseReason::RsiTakeProfit { rsi: value });
            }
        }

        let held_minutes = position.held_minutes(now);
        if self.max_hold_minutes > 0 && held_minutes >= self.max_hold_minutes {
            return Some(CloseReason::Timeout { held_minutes });
        }
        None
    }

    fn cooldown(&self) -> Option<Duration> {
        (self.cooldown_minutes > 0).then(|| Duration::minutes(self.cooldown_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::tests::new_position;
    use crate::strategy::tests::make_series;

    fn strategy(period: usize) -> RsiContrarian {
        RsiContrarian::from_params(&StrategyParameters {
            rsi_period: period,
            ..StrategyParameters::default()
        })
    }

    #[test]
    fn all_gains_is_overbought() {
        let series = make_series(&[10.0, 11.0, 12.0]);
        let signal = strategy(2).analyze(&series.full_window());
        assert_eq!(signal.action, SignalAction::Short);
        assert_eq!(signal.reason.as_deref(), Some("RSI 100.00 > overbought 70"));
    }

    #[test]
    fn all_losses_is_oversold() {
        let series = make_series(&[12.0, 11.0, 10.0]);
        assert_eq!(
            strategy(2).analyze(&series.full_window()).action,
            SignalAction::Buy
        );
    }

    #[test]
    fn neutral_rsi_holds() {
        let series = make_series(&[10.0, 11.0, 10.0]);
        assert!(strategy(2).analyze(&series.full_window()).is_hold());
    }

    #[test]
    fn long_takes_profit_above_exit_level() {
        // position opened at minute 0 (same clock as make_series)
        let pos = new_position(Side::Long, 10.0);
        let series = make_series(&[10.0, 11.0, 12.0]);
        let window = series.full_window();
        let reason = strategy(2).exit_signal(&pos, &window, window.now().unwrap());
        assert_eq!(reason, Some(CloseReason::RsiTakeProfit { rsi: 100.0 }));

        let short = new_position(Side::Short, 12.0);
        assert_eq!(
            strategy(2).exit_signal(&short, &window, window.now().unwrap()),
            None
        );
    }

    #[test]
    fn timeout_after_max_hold() {
        let pos = new_position(Side::Short, 10.0);
        // rising prices: RSI 100 is not below the short exit level
        let series = make_series(&[10.0, 11.0, 12.0]);
        let window = series.full_window();
        let later = pos.opened_at + Duration::minutes(60);
        assert_eq!(
            strategy(2).exit_signal(&pos, &window, later),
            Some(CloseReason::Timeout { held_minutes: 60 })
        );
        let earlier = pos.opened_at + Duration::minutes(59);
        assert_eq!(strategy(2).exit_signal(&pos, &window, earlier), None);
    }

    #[test]
    fn zero_cooldown_disables_it() {
        let mut s = strategy(14);
        s.cooldown_minutes = 0;
        assert_eq!(s.cooldown(), None);
    }
}

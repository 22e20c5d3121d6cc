//! Strategies: pure mappings from a price window to a trading signal.
//!
//! A strategy never sees ledger or exchange state. The only position-aware
//! hook is `exit_signal`, which inspects a single position and the same price
//! window, and is used by the per-tick exit check.

pub mod breakout;
pub mod ma_cross;
pub mod params;
pub mod rsi_contrarian;

pub use breakout::Breakout;
pub use ma_cross::MaCross;
pub use params::StrategyParameters;
pub use rsi_contrarian::RsiContrarian;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{CloseReason, Position, PriceWindow, TradingSignal};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("unknown strategy identifier: {id}")]
    UnknownStrategy { id: String },
}

/// Strategy families. Cooldowns apply across every configuration of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Breakout,
    RsiContrarian,
    MaCross,
}

impl StrategyFamily {
    pub fn id(self) -> &'static str {
        match self {
            StrategyFamily::Breakout => "breakout",
            StrategyFamily::RsiContrarian => "rsi_contrarian",
            StrategyFamily::MaCross => "ma_cross",
        }
    }
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for StrategyFamily {
    type Err = StrategyError;

    /// Accepts the canonical ids plus the older class-style names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.rsplit('\\').next().unwrap_or(s);
        match trimmed {
            "breakout" | "high_low_breakout" | "HighLowBreakoutStrategy" => {
                Ok(StrategyFamily::Breakout)
            }
            "rsi_contrarian" | "rsi" | "RSIContrarianStrategy" => Ok(StrategyFamily::RsiContrarian),
            "ma_cross" | "moving_average_cross" | "sma_cross" | "SimpleMovingAverageStrategy" => {
                Ok(StrategyFamily::MaCross)
            }
            _ => Err(StrategyError::UnknownStrategy { id: s.to_string() }),
        }
    }
}

/// Trait for signal generators.
///
/// # Contract
/// `analyze` is deterministic for a given window and must return `hold`
/// instead of failing when history is short.
pub trait SignalGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn family(&self) -> StrategyFamily;

    /// Samples needed before `analyze` can return anything other than hold.
    fn warmup(&self) -> usize;

    fn analyze(&self, window: &PriceWindow<'_>) -> TradingSignal;

    /// Strategy-defined exit for a position owned by this configuration.
    fn exit_signal(
        &self,
        _position: &Position,
        _window: &PriceWindow<'_>,
        _now: DateTime<Utc>,
    ) -> Option<CloseReason> {
        None
    }

    /// Entry suspension after a losing close in this family, if any.
    fn cooldown(&self) -> Option<Duration> {
        None
    }
}

/// Resolve a strategy identifier into a runtime trait object.
pub fn build_strategy(
    id: &str,
    params: &StrategyParameters,
) -> Result<Box<dyn SignalGenerator>, StrategyError> {
    let family: StrategyFamily = id.parse()?;
    Ok(match family {
        StrategyFamily::Breakout => Box::new(Breakout::from_params(params)),
        StrategyFamily::RsiContrarian => Box::new(RsiContrarian::from_params(params)),
        StrategyFamily::MaCross => Box::new(MaCross::from_params(params)),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::domain::PriceSeries;

    /// One sample per minute starting at 2025-01-01 00:00 UTC.
    pub(crate) fn make_series(prices: &[f64]) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut series = PriceSeries::new("BTC/JPY");
        for (i, &p) in prices.iter().enumerate() {
            series.push(p, start + Duration::minutes(i as i64)).unwrap();
        }
        series
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!("breakout".parse(), Ok(StrategyFamily::Breakout));
        assert_eq!(
            "App\\Trading\\Strategy\\HighLowBreakoutStrategy".parse(),
            Ok(StrategyFamily::Breakout)
        );
        assert_eq!("RSIContrarianStrategy".parse(), Ok(StrategyFamily::RsiContrarian));
        assert_eq!("moving_average_cross".parse(), Ok(StrategyFamily::MaCross));
    }

    #[test]
    fn unknown_identifier_is_an_error() {
        let err = build_strategy("martingale", &StrategyParameters::default())
            .err()
            .unwrap();
        assert_eq!(
            err,
            StrategyError::UnknownStrategy {
                id: "martingale".into()
            }
        );
    }

    #[test]
    fn factory_builds_each_family() {
        let params = StrategyParameters::default();
        for id in ["breakout", "rsi_contrarian", "ma_cross"] {
            let strategy = build_strategy(id, &params).unwrap();
            assert_eq!(strategy.family().id(), id);
        }
    }

    #[test]
    fn only_rsi_has_cooldown() {
        let params = StrategyParameters::default();
        assert!(build_strategy("breakout", &params).unwrap().cooldown().is_none());
        assert_eq!(
            build_strategy("rsi_contrarian", &params).unwrap().cooldown(),
            Some(Duration::minutes(30))
        );
    }
}

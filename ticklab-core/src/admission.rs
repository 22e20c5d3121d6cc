//! Admission control: pre-entry gates.
//!
//! Gates run only for new entries, cheapest first: cooldown, position cap,
//! then spread. The spread is fetched lazily through a closure so a rejected
//! entry never costs a network call. Exits and reversal liquidations never
//! pass through here.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Side;
use crate::strategy::{SignalGenerator, StrategyParameters};

/// Why an entry was not admitted. Not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum RejectReason {
    Cooldown {
        until: DateTime<Utc>,
    },
    PositionCap {
        side: Side,
        open: usize,
        max: usize,
    },
    SpreadTooWide {
        spread: f64,
        limit: f64,
        max_spread_percent: f64,
    },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Cooldown { until } => {
                write!(f, "cooling down after a losing close until {until}")
            }
            RejectReason::PositionCap { side, open, max } => {
                write!(f, "{open} {side} positions open (max {max})")
            }
            RejectReason::SpreadTooWide {
                spread,
                limit,
                max_spread_percent,
            } => write!(
                f,
                "spread {spread} exceeds {limit} ({max_spread_percent}% of price)"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdmissionDecision {
    Admitted,
    Rejected(RejectReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionControl {
    pub max_positions: usize,
    pub max_spread_percent: f64,
    pub cooldown: Option<Duration>,
}

impl AdmissionControl {
    pub fn new(params: &StrategyParameters, strategy: &dyn SignalGenerator) -> Self {
        Self {
            max_positions: params.max_positions,
            max_spread_percent: params.max_spread_percent,
            cooldown: strategy.cooldown(),
        }
    }

    /// Start of the window in which losing closes suspend entries.
    pub fn cooldown_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cooldown.map(|window| now - window)
    }

    pub fn spread_limit(&self, price: f64) -> f64 {
        price * self.max_spread_percent / 100.0
    }

    /// Run every gate for an entry on `side`.
    ///
    /// `open_same_side` is counted after any reversal liquidation.
    /// `last_losing_close` is the most recent losing close in the strategy
    /// family since `cooldown_since(now)`.
    pub fn evaluate<E>(
        &self,
        side: Side,
        open_same_side: usize,
        price: f64,
        last_losing_close: Option<DateTime<Utc>>,
        spread: impl FnOnce() -> Result<f64, E>,
    ) -> Result<AdmissionDecision, E> {
        if let (Some(window), Some(closed_at)) = (self.cooldown, last_losing_close) {
            return Ok(AdmissionDecision::Rejected(RejectReason::Cooldown {
                until: closed_at + window,
            }));
        }

        if open_same_side >= self.max_positions {
            return Ok(AdmissionDecision::Rejected(RejectReason::PositionCap {
                side,
                open: open_same_side,
                max: self.max_positions,
            }));
        }

        let spread = spread()?;
        let limit = self.spread_limit(price);
        if spread > limit {
            return Ok(AdmissionDecision::Rejected(RejectReason::SpreadTooWide {
                spread,
                limit,
                max_spread_percent: self.max_spread_percent,
            }));
        }

        Ok(AdmissionDecision::Admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::convert::Infallible;

    fn control(cooldown_minutes: Option<i64>) -> AdmissionControl {
        AdmissionControl {
            max_positions: 2,
            max_spread_percent: 0.1,
            cooldown: cooldown_minutes.map(Duration::minutes),
        }
    }

    fn spread(value: f64) -> impl FnOnce() -> Result<f64, Infallible> {
        move || Ok(value)
    }

    #[test]
    fn admits_within_limits() {
        let decision = control(None)
            .evaluate(Side::Long, 1, 1000.0, None, spread(0.5))
            .unwrap();
        assert_eq!(decision, AdmissionDecision::Admitted);
    }

    #[test]
    fn cap_rejects_at_max() {
        let decision = control(None)
            .evaluate(Side::Short, 2, 1000.0, None, spread(0.0))
            .unwrap();
        assert_eq!(
            decision,
            AdmissionDecision::Rejected(RejectReason::PositionCap {
                side: Side::Short,
                open: 2,
                max: 2
            })
        );
        if let AdmissionDecision::Rejected(reason) = decision {
            assert_eq!(reason.to_string(), "2 short positions open (max 2)");
        }
    }

    #[test]
    fn spread_gate_rejects_wide_spreads() {
        // limit = 1000 * 0.1 / 100 = 1.0
        let c = control(None);
        assert!(c
            .evaluate(Side::Long, 0, 1000.0, None, spread(0.99))
            .unwrap()
            .is_admitted());
        assert!(matches!(
            c.evaluate(Side::Long, 0, 1000.0, None, spread(1.5)).unwrap(),
            AdmissionDecision::Rejected(RejectReason::SpreadTooWide { .. })
        ));
    }

    #[test]
    fn cooldown_rejects_before_fetching_spread() {
        let closed_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let decision = control(Some(30))
            .evaluate(Side::Long, 0, 1000.0, Some(closed_at), || -> Result<f64, String> {
                Err("spread must not be fetched".into())
            })
            .unwrap();
        assert_eq!(
            decision,
            AdmissionDecision::Rejected(RejectReason::Cooldown {
                until: closed_at + Duration::minutes(30)
            })
        );
    }

    #[test]
    fn losing_close_ignored_without_cooldown() {
        let closed_at = Utc::now();
        assert!(control(None)
            .evaluate(Side::Long, 0, 1000.0, Some(closed_at), spread(0.0))
            .unwrap()
            .is_admitted());
    }

    #[test]
    fn spread_fetch_errors_propagate() {
        let err = control(None)
            .evaluate(Side::Long, 0, 1000.0, None, || -> Result<f64, String> {
                Err("timeout".into())
            })
            .unwrap_err();
        assert_eq!(err, "timeout");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Buy,
    Sell,
    Short,
    Hold,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Short => "short",
            SignalAction::Hold => "hold",
        };
        f.write_str(s)
    }
}

/// Ephemeral strategy output for one tick.
///
/// `price == None` means a market order whose fill price is discovered at
/// execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub action: SignalAction,
    pub quantity: f64,
    pub price: Option<f64>,
    pub reason: Option<String>,
}

impl TradingSignal {
    pub fn hold() -> Self {
        Self {
            action: SignalAction::Hold,
            quantity: 0.0,
            price: None,
            reason: None,
        }
    }

    pub fn hold_because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::hold()
        }
    }

    pub fn market(action: SignalAction, quantity: f64, reason: impl Into<String>) -> Self {
        Self {
            action,
            quantity,
            price: None,
            reason: Some(reason.into()),
        }
    }

    /// Signal carrying a limit price; entries are submitted as limit orders.
    pub fn limit(
        action: SignalAction,
        quantity: f64,
        price: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            price: Some(price),
            ..Self::market(action, quantity, reason)
        }
    }

    /// Side a new position would take, for entry actions only.
    pub fn entry_side(&self) -> Option<Side> {
        match self.action {
            SignalAction::Buy => Some(Side::Long),
            SignalAction::Short => Some(Side::Short),
            SignalAction::Sell | SignalAction::Hold => None,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action == SignalAction::Hold
    }
}

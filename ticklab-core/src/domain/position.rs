//! Position: one open or closed directional exposure.
//!
//! A position is created by a successful entry fill, mutated in place while
//! open (trailing-stop ratchet, resting exit-order bookkeeping) and closed
//! exactly once. After closing, every mutator returns `PositionError::Closed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::{ConfigId, OrderId, PositionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
    RsiTakeProfit { rsi: f64 },
    Timeout { held_minutes: i64 },
    StrategyExit,
    SignalExit,
    Reversal,
    ExitOrderFilled,
    EmergencyExit,
    EndOfData,
}

impl CloseReason {
    /// Stable label used in event-log actions and exports.
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TrailingStop => "trailing_stop",
            CloseReason::RsiTakeProfit { .. } => "rsi_take_profit",
            CloseReason::Timeout { .. } => "timeout",
            CloseReason::StrategyExit => "strategy_exit",
            CloseReason::SignalExit => "signal_exit",
            CloseReason::Reversal => "reverse_breakout",
            CloseReason::ExitOrderFilled => "exit_order_filled",
            CloseReason::EmergencyExit => "emergency_exit",
            CloseReason::EndOfData => "backtest_end",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::RsiTakeProfit { rsi } => write!(f, "rsi_take_profit (rsi {rsi:.2})"),
            CloseReason::Timeout { held_minutes } => write!(f, "timeout ({held_minutes} min)"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position {0} is already closed")]
    Closed(PositionId),

    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),

    #[error("price must be finite and positive, got {0}")]
    InvalidPrice(f64),

    #[error("position {0} not found")]
    NotFound(PositionId),
}

/// Everything needed to open a position; the ledger assigns the id.
#[derive(Debug, Clone)]
pub struct NewPosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_fee: f64,
    pub trailing_stop_price: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub config_id: ConfigId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_fee: f64,
    pub exit_price: Option<f64>,
    pub exit_fee: Option<f64>,
    pub trailing_stop_price: Option<f64>,
    pub status: PositionStatus,
    /// Gross realized PnL, set on close.
    pub profit_loss: Option<f64>,
    pub close_reason: Option<CloseReason>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub config_id: ConfigId,
    /// Resting limit exit order left by an older revision, if any.
    pub exit_order_id: Option<OrderId>,
    pub exit_order_price: Option<f64>,
}

impl Position {
    pub fn open(id: PositionId, new: NewPosition) -> Result<Self, PositionError> {
        if new.quantity <= 0.0 || !new.quantity.is_finite() {
            return Err(PositionError::NonPositiveQuantity(new.quantity));
        }
        if !new.entry_price.is_finite() || new.entry_price <= 0.0 {
            return Err(PositionError::InvalidPrice(new.entry_price));
        }
        Ok(Self {
            id,
            symbol: new.symbol,
            side: new.side,
            quantity: new.quantity,
            entry_price: new.entry_price,
            entry_fee: new.entry_fee,
            exit_price: None,
            exit_fee: None,
            trailing_stop_price: new.trailing_stop_price,
            status: PositionStatus::Open,
            profit_loss: None,
            close_reason: None,
            opened_at: new.opened_at,
            closed_at: None,
            config_id: new.config_id,
            exit_order_id: None,
            exit_order_price: None,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Gross PnL if the position were closed at `price`.
    pub fn gross_pnl_at(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price) * self.quantity
    }

    /// Close the position. Returns the gross PnL.
    pub fn close(
        &mut self,
        exit_price: f64,
        exit_fee: f64,
        closed_at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<f64, PositionError> {
        self.ensure_open()?;
        if !exit_price.is_finite() || exit_price <= 0.0 {
            return Err(PositionError::InvalidPrice(exit_price));
        }
        let gross = self.gross_pnl_at(exit_price);
        self.exit_price = Some(exit_price);
        self.exit_fee = Some(exit_fee);
        self.profit_loss = Some(gross);
        self.closed_at = Some(closed_at);
        self.close_reason = Some(reason);
        self.status = PositionStatus::Closed;
        self.exit_order_id = None;
        self.exit_order_price = None;
        Ok(gross)
    }

    /// Entry fee plus exit fee; a missing exit fee counts as zero.
    pub fn total_fee(&self) -> f64 {
        self.entry_fee + self.exit_fee.unwrap_or(0.0)
    }

    /// Realized PnL after fees, `None` while open.
    pub fn net_profit_loss(&self) -> Option<f64> {
        self.profit_loss.map(|gross| gross - self.total_fee())
    }

    /// Move the trailing stop to `candidate` if it is more favorable.
    ///
    /// Returns whether the stored stop changed. Long stops only rise and
    /// short stops only fall.
    pub fn ratchet_trailing(&mut self, candidate: f64) -> Result<bool, PositionError> {
        self.ensure_open()?;
        let tighter = match (self.trailing_stop_price, self.side) {
            (None, _) => true,
            (Some(stored), Side::Long) => candidate > stored,
            (Some(stored), Side::Short) => candidate < stored,
        };
        if tighter {
            self.trailing_stop_price = Some(candidate);
        }
        Ok(tighter)
    }

    pub fn set_exit_order(
        &mut self,
        order: Option<(OrderId, f64)>,
    ) -> Result<(), PositionError> {
        self.ensure_open()?;
        match order {
            Some((id, price)) => {
                self.exit_order_id = Some(id);
                self.exit_order_price = Some(price);
            }
            None => {
                self.exit_order_id = None;
                self.exit_order_price = None;
            }
        }
        Ok(())
    }

    pub fn held_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.opened_at).num_minutes()
    }

    fn ensure_open(&self) -> Result<(), PositionError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PositionError::Closed(self.id))
        }
    }
}

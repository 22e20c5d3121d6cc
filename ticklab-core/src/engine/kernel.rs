//! Per-tick decision kernel shared by the live coordinator and the backtest.
//!
//! The kernel decides; callers execute. `check_exit` runs the exit precedence
//! for one open position and applies the trailing-stop ratchet in place.
//! `plan_entry` turns a signal into the liquidations and entry the caller must
//! attempt. Neither touches an exchange.

use chrono::{DateTime, Utc};

use crate::domain::{
    CloseReason, ConfigId, Position, PositionError, PositionId, PriceWindow, Side, SignalAction,
    TradingSignal,
};
use crate::ledger::{stop_breached, StopRules};
use crate::strategy::SignalGenerator;

/// Inputs to the exit check for one tick.
pub struct ExitContext<'a> {
    pub price: f64,
    pub now: DateTime<Utc>,
    pub window: &'a PriceWindow<'a>,
    pub strategy: &'a dyn SignalGenerator,
    /// Configuration running this tick; strategy exits apply only to its positions.
    pub owner: &'a ConfigId,
    pub rules: StopRules,
}

/// Exit precedence for one open position; first match wins.
///
/// 1. strategy-defined exit (owned positions only)
/// 2. trailing-stop breach, after this tick's ratchet
/// 3. fixed stop-loss breach
///
/// A position without a trailing stop gets one initialized from its entry
/// price instead of being ratcheted this tick.
pub fn check_exit(
    position: &mut Position,
    ctx: &ExitContext<'_>,
) -> Result<Option<CloseReason>, PositionError> {
    if !position.is_open() {
        return Ok(None);
    }

    if position.config_id == *ctx.owner {
        if let Some(reason) = ctx.strategy.exit_signal(position, ctx.window, ctx.now) {
            return Ok(Some(reason));
        }
    }

    let side = position.side;
    let proposed = match position.trailing_stop_price {
        None => ctx.rules.initial_trailing(side, position.entry_price),
        Some(_) => ctx.rules.trailing_candidate(side, ctx.price),
    };
    position.ratchet_trailing(proposed)?;

    if let Some(stop) = position.trailing_stop_price {
        if stop_breached(side, ctx.price, stop) {
            return Ok(Some(CloseReason::TrailingStop));
        }
    }

    let fixed = ctx.rules.fixed_stop(side, position.entry_price);
    if stop_breached(side, ctx.price, fixed) {
        return Ok(Some(CloseReason::StopLoss));
    }

    Ok(None)
}

/// What a signal asks the caller to do after the exit pass.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPlan {
    Hold,
    /// Close the most recently opened long (death cross).
    CloseLatestLong(PositionId),
    /// `sell` with no long open.
    NothingToSell,
    /// Close every id in `reversal` in order, then admit and open `side`.
    Enter {
        side: Side,
        quantity: f64,
        price: Option<f64>,
        reversal: Vec<PositionId>,
    },
}

pub fn plan_entry<'p>(
    signal: &TradingSignal,
    open: impl IntoIterator<Item = &'p Position>,
) -> EntryPlan {
    let mut open: Vec<&Position> = open.into_iter().filter(|p| p.is_open()).collect();
    open.sort_by_key(|p| (p.opened_at, p.id));

    match signal.action {
        SignalAction::Hold => EntryPlan::Hold,
        SignalAction::Sell => match open.iter().rev().find(|p| p.side == Side::Long) {
            Some(long) => EntryPlan::CloseLatestLong(long.id),
            None => EntryPlan::NothingToSell,
        },
        SignalAction::Buy | SignalAction::Short => {
            let side = if signal.action == SignalAction::Buy {
                Side::Long
            } else {
                Side::Short
            };
            EntryPlan::Enter {
                side,
                quantity: signal.quantity,
                price: signal.price,
                reversal: open
                    .iter()
                    .filter(|p| p.side == side.opposite())
                    .map(|p| p.id)
                    .collect(),
            }
        }
    }
}

/// Most recent close with negative realized PnL among `closed`.
pub fn last_losing_close<'p>(
    closed: impl IntoIterator<Item = &'p Position>,
) -> Option<DateTime<Utc>> {
    closed
        .into_iter()
        .filter(|p| p.profit_loss.is_some_and(|pnl| pnl < 0.0))
        .filter_map(|p| p.closed_at)
        .max()
}

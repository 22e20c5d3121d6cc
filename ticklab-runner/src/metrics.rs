//! Trade statistics: pure functions from closed positions to scalars.
//!
//! A trade counts as a win when its net PnL (after both fees) is strictly
//! positive. Everything else, including break-even, counts as a loss.

use serde::{Deserialize, Serialize};
use ticklab_core::domain::Position;

/// Profit factor reported when there are wins and no losses.
pub const NO_LOSS_PROFIT_FACTOR: f64 = 999.0;

/// Aggregate statistics over a trade list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades that won.
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_pnl: f64,
    pub total_win: f64,
    /// Magnitude of the summed losses (non-negative).
    pub total_loss: f64,
    pub profit_factor: f64,
}

impl TradeStats {
    pub fn compute(trades: &[Position]) -> Self {
        let pnls = net_pnls(trades);
        if pnls.is_empty() {
            return Self::default();
        }

        let winning_trades = pnls.iter().filter(|p| **p > 0.0).count();
        let total_pnl: f64 = pnls.iter().sum();
        let total_win: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let total_loss = pnls.iter().filter(|p| **p <= 0.0).sum::<f64>().abs();

        Self {
            total_trades: pnls.len(),
            winning_trades,
            losing_trades: pnls.len() - winning_trades,
            win_rate: win_rate(&pnls),
            total_pnl,
            average_pnl: total_pnl / pnls.len() as f64,
            total_win,
            total_loss,
            profit_factor: profit_factor(total_win, total_loss),
        }
    }
}

/// Net PnL per closed trade, in trade order. Open positions are skipped.
pub fn net_pnls(trades: &[Position]) -> Vec<f64> {
    trades.iter().filter_map(Position::net_profit_loss).collect()
}

pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64 * 100.0
}

/// Gross wins over gross losses, with `NO_LOSS_PROFIT_FACTOR` when nothing
/// lost and 0 when nothing won.
pub fn profit_factor(total_win: f64, total_loss: f64) -> f64 {
    if total_loss > 0.0 {
        total_win / total_loss
    } else if total_win > 0.0 {
        NO_LOSS_PROFIT_FACTOR
    } else {
        0.0
    }
}

/// Total PnL per unit of drawdown; 0 when there was no drawdown.
pub fn risk_adjusted_return(total_pnl: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        0.0
    } else {
        total_pnl / max_drawdown.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use ticklab_core::domain::{CloseReason, ConfigId, NewPosition, Side};
    use ticklab_core::ledger::PositionLedger;

    fn closed_trades(pnls: &[f64]) -> Vec<Position> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut ledger = PositionLedger::new();
        pnls.iter()
            .enumerate()
            .map(|(i, pnl)| {
                let id = ledger
                    .open(NewPosition {
                        symbol: "BTC/JPY".into(),
                        side: Side::Long,
                        quantity: 1.0,
                        entry_price: 100.0,
                        entry_fee: 0.0,
                        trailing_stop_price: None,
                        opened_at: start + Duration::minutes(i as i64),
                        config_id: ConfigId::new("m"),
                    })
                    .unwrap()
                    .id;
                ledger
                    .close(
                        id,
                        100.0 + pnl,
                        0.0,
                        start + Duration::minutes(i as i64 + 1),
                        CloseReason::SignalExit,
                    )
                    .unwrap()
                    .clone()
            })
            .collect()
    }

    #[test]
    fn stats_over_mixed_trades() {
        let stats = TradeStats::compute(&closed_trades(&[10.0, -4.0, 6.0, 0.0]));
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.win_rate, 50.0);
        assert!((stats.total_pnl - 12.0).abs() < 1e-9);
        assert!((stats.average_pnl - 3.0).abs() < 1e-9);
        assert!((stats.total_win - 16.0).abs() < 1e-9);
        assert!((stats.total_loss - 4.0).abs() < 1e-9);
        assert!((stats.profit_factor - 4.0).abs() < 1e-9);
    }

    #[test]
    fn empty_trade_list_is_all_zero() {
        assert_eq!(TradeStats::compute(&[]), TradeStats::default());
    }

    #[test]
    fn profit_factor_sentinels() {
        assert_eq!(profit_factor(5.0, 0.0), NO_LOSS_PROFIT_FACTOR);
        assert_eq!(profit_factor(0.0, 0.0), 0.0);
        assert_eq!(profit_factor(0.0, 3.0), 0.0);
    }

    #[test]
    fn break_even_counts_as_loss() {
        let stats = TradeStats::compute(&closed_trades(&[0.0, 0.0]));
        assert_eq!(stats.winning_trades, 0);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.profit_factor, 0.0);
    }

    #[test]
    fn risk_adjusted_zero_without_drawdown() {
        assert_eq!(risk_adjusted_return(50.0, 0.0), 0.0);
        assert_eq!(risk_adjusted_return(50.0, 25.0), 2.0);
    }
}

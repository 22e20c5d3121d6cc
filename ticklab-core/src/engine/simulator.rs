//! Backtest simulator: replays the tick kernel over a stored price series.
//!
//! Each tick runs the same steps as the live coordinator:
//! 1. exit check for every open position (strategy exit, trailing, fixed stop)
//! 2. signal
//! 3. reversal liquidation, admission, entry
//!
//! Strategies see only the last `market_data_limit` samples, as they would
//! from a live market-data fetch. Fills are immediate at the signal price
//! (or the tick price for market signals). A flat fee rate is charged on
//! each side of the round trip. Admission uses a static spread assumption
//! instead of a network fetch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::admission::{AdmissionControl, AdmissionDecision};
use crate::domain::{
    CloseReason, ConfigId, NewPosition, Position, PositionError, PositionId, PriceSeries,
};
use crate::ledger::{PositionLedger, StopRules};
use crate::strategy::{SignalGenerator, StrategyParameters};

use super::kernel::{check_exit, last_losing_close, plan_entry, EntryPlan, ExitContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Fee per side as a fraction of notional (0.0005 = 0.05%).
    pub fee_rate: f64,
    /// Spread assumed for the admission spread gate.
    pub assumed_spread: f64,
    /// Configuration id stamped on simulated positions.
    pub config_id: ConfigId,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fee_rate: 0.0005,
            assumed_spread: 0.0,
            config_id: ConfigId::new("backtest"),
        }
    }
}

/// Raw output of one simulated run; statistics are derived by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    /// Closed positions in close order.
    pub trades: Vec<Position>,
    /// Largest peak-to-trough decline of cumulative net realized PnL.
    pub max_drawdown: f64,
    /// Entries refused by admission control.
    pub rejected_entries: usize,
    pub ticks: usize,
}

pub struct BacktestSimulator<'a> {
    strategy: &'a dyn SignalGenerator,
    params: &'a StrategyParameters,
    settings: SimulationSettings,
}

impl<'a> BacktestSimulator<'a> {
    pub fn new(
        strategy: &'a dyn SignalGenerator,
        params: &'a StrategyParameters,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            strategy,
            params,
            settings,
        }
    }

    pub fn run(&self, series: &PriceSeries) -> Result<SimulationRun, PositionError> {
        let mut state = RunState::new(self.settings.fee_rate);
        let rules = StopRules::from_params(self.params);
        let admission = AdmissionControl::new(self.params, self.strategy);
        let owner = &self.settings.config_id;
        let family = std::slice::from_ref(owner);
        let symbol = series.symbol();

        for end in 1..=series.len() {
            let window = series.recent_window(end, self.params.market_data_limit);
            let (Some(price), Some(now)) = (window.current(), window.now()) else {
                continue;
            };

            let ctx = ExitContext {
                price,
                now,
                window: &window,
                strategy: self.strategy,
                owner,
                rules,
            };
            for id in state.ledger.open_ids(symbol) {
                let position = state.ledger.get_mut(id)?;
                if let Some(reason) = check_exit(position, &ctx)? {
                    state.close(id, price, now, reason)?;
                }
            }

            let signal = self.strategy.analyze(&window);
            match plan_entry(&signal, state.ledger.open_positions(symbol)) {
                EntryPlan::Hold | EntryPlan::NothingToSell => {}
                EntryPlan::CloseLatestLong(id) => {
                    state.close(id, price, now, CloseReason::SignalExit)?;
                }
                EntryPlan::Enter {
                    side,
                    quantity,
                    price: limit,
                    reversal,
                } => {
                    for id in reversal {
                        state.close(id, price, now, CloseReason::Reversal)?;
                    }

                    let last_loss = admission
                        .cooldown_since(now)
                        .and_then(|since| last_losing_close(state.ledger.closed_since(family, since)));
                    let fill = limit.unwrap_or(price);
                    let decision = admission.evaluate(
                        side,
                        state.ledger.open_count(symbol, side),
                        fill,
                        last_loss,
                        || Ok::<f64, Infallible>(self.settings.assumed_spread),
                    );
                    match decision {
                        Ok(AdmissionDecision::Admitted) => {
                            state.ledger.open(NewPosition {
                                symbol: symbol.to_string(),
                                side,
                                quantity,
                                entry_price: fill,
                                entry_fee: fill * quantity * self.settings.fee_rate,
                                trailing_stop_price: Some(rules.initial_trailing(side, fill)),
                                opened_at: now,
                                config_id: owner.clone(),
                            })?;
                        }
                        Ok(AdmissionDecision::Rejected(_)) => state.rejected_entries += 1,
                        Err(never) => match never {},
                    }
                }
            }

            state.mark_drawdown();
        }

        if let Some(last) = series.last() {
            for id in state.ledger.open_ids(symbol) {
                state.close(id, last.price, last.recorded_at, CloseReason::EndOfData)?;
            }
            state.mark_drawdown();
        }

        Ok(SimulationRun {
            trades: state.trades,
            max_drawdown: state.max_drawdown,
            rejected_entries: state.rejected_entries,
            ticks: series.len(),
        })
    }
}

struct RunState {
    ledger: PositionLedger,
    fee_rate: f64,
    trades: Vec<Position>,
    cumulative: f64,
    peak: f64,
    max_drawdown: f64,
    rejected_entries: usize,
}

impl RunState {
    fn new(fee_rate: f64) -> Self {
        Self {
            ledger: PositionLedger::new(),
            fee_rate,
            trades: Vec::new(),
            cumulative: 0.0,
            peak: 0.0,
            max_drawdown: 0.0,
            rejected_entries: 0,
        }
    }

    fn close(
        &mut self,
        id: PositionId,
        price: f64,
        at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<(), PositionError> {
        let quantity = self.ledger.get_mut(id)?.quantity;
        let closed = self
            .ledger
            .close(id, price, price * quantity * self.fee_rate, at, reason)?;
        self.cumulative += closed.net_profit_loss().unwrap_or(0.0);
        self.trades.push(closed.clone());
        Ok(())
    }

    fn mark_drawdown(&mut self) {
        self.peak = self.peak.max(self.cumulative);
        self.max_drawdown = self.max_drawdown.max(self.peak - self.cumulative);
    }
}
